use std::fmt;

/// Role/status bitfield for a backend (spec §3 "Roles form a bitfield;
/// transitions are monitor-driven"). Named after the roles the monitor (C5)
/// assigns in §4.6, not the original source's status constants.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct RoleFlags(u8);

macro_rules! bits {
    ($($name:ident = $val:expr, $doc:literal;)*) => {
        impl RoleFlags {
            $(
                #[doc = $doc]
                pub const $name: RoleFlags = RoleFlags($val);
            )*
        }
    };
}

bits! {
    RUNNING                  = 0x01, "The monitor's last probe connected successfully.";
    MASTER                   = 0x02, "Replication-tree root, or a standalone/stale promotion.";
    SLAVE                    = 0x04, "Has a replication source and is not the root.";
    RELAY_MASTER             = 0x08, "A slave that is also a source for downstream slaves.";
    MAINTENANCE              = 0x10, "Administratively excluded from selection.";
    AUTH_ERROR               = 0x20, "The monitor's credentials were rejected by this backend.";
    SLAVE_OF_EXTERNAL_MASTER = 0x40, "Replicates from a server outside the configured cluster.";
    STALE_STATUS             = 0x80, "Role retained past the condition that earned it (§4.6 steps 7-8).";
}

impl RoleFlags {
    pub const fn empty() -> Self {
        RoleFlags(0)
    }

    pub fn contains(&self, other: RoleFlags) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: RoleFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: RoleFlags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: RoleFlags) -> Self {
        RoleFlags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for RoleFlags {
    type Output = RoleFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for RoleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

const NAMED_BITS: &[(RoleFlags, &str)] = &[
    (RoleFlags::RUNNING, "RUNNING"),
    (RoleFlags::MASTER, "MASTER"),
    (RoleFlags::SLAVE, "SLAVE"),
    (RoleFlags::RELAY_MASTER, "RELAY_MASTER"),
    (RoleFlags::MAINTENANCE, "MAINTENANCE"),
    (RoleFlags::AUTH_ERROR, "AUTH_ERROR"),
    (RoleFlags::SLAVE_OF_EXTERNAL_MASTER, "SLAVE_OF_EXTERNAL_MASTER"),
    (RoleFlags::STALE_STATUS, "STALE_STATUS"),
];

impl fmt::Display for RoleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("UNKNOWN");
        }
        let mut first = true;
        for (bit, name) in NAMED_BITS {
            if self.contains(*bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
