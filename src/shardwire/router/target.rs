/// Route-target bitfield the RWR computes per statement (spec §4.4).
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct RouteTargetFlags(u8);

impl RouteTargetFlags {
    pub const MASTER: RouteTargetFlags = RouteTargetFlags(0x01);
    pub const SLAVE: RouteTargetFlags = RouteTargetFlags(0x02);
    pub const ALL: RouteTargetFlags = RouteTargetFlags(0x04);
    pub const NAMED_SERVER: RouteTargetFlags = RouteTargetFlags(0x08);
    pub const RLAG_MAX: RouteTargetFlags = RouteTargetFlags(0x10);

    pub fn contains(&self, other: RouteTargetFlags) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: RouteTargetFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for RouteTargetFlags {
    type Output = RouteTargetFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        RouteTargetFlags(self.0 | rhs.0)
    }
}

/// Routing hints a client can attach to a statement (e.g. a comment-embedded
/// directive) that the RWR consults for READ statements (spec §4.4 step 2).
#[derive(Debug, Clone, Default)]
pub struct RouteHints {
    pub route_to_master: bool,
    pub named_server: Option<String>,
    pub max_slave_replication_lag: Option<u64>,
}

/// The fully resolved route target for one statement (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct RouteTarget {
    pub flags: RouteTargetFlags,
    pub named_server: Option<String>,
    pub max_slave_replication_lag: Option<u64>,
}

impl RouteTarget {
    pub fn master() -> Self {
        RouteTarget { flags: RouteTargetFlags::MASTER, named_server: None, max_slave_replication_lag: None }
    }

    pub fn all() -> Self {
        RouteTarget { flags: RouteTargetFlags::ALL, named_server: None, max_slave_replication_lag: None }
    }

    /// `SLAVE`, then applies routing hints per spec §4.4 step 2.
    pub fn slave_with_hints(hints: &RouteHints) -> Self {
        if hints.route_to_master {
            return RouteTarget::master();
        }
        let mut flags = RouteTargetFlags::SLAVE;
        let mut named_server = None;
        if let Some(name) = &hints.named_server {
            flags.insert(RouteTargetFlags::NAMED_SERVER);
            named_server = Some(name.clone());
        }
        let mut max_slave_replication_lag = None;
        if let Some(n) = hints.max_slave_replication_lag {
            flags.insert(RouteTargetFlags::RLAG_MAX);
            max_slave_replication_lag = Some(n);
        }
        RouteTarget { flags, named_server, max_slave_replication_lag }
    }

    pub fn is_master(&self) -> bool {
        self.flags.contains(RouteTargetFlags::MASTER)
    }

    pub fn is_all(&self) -> bool {
        self.flags.contains(RouteTargetFlags::ALL)
    }

    pub fn is_slave(&self) -> bool {
        self.flags.contains(RouteTargetFlags::SLAVE)
    }
}
