use std::fmt;

/// Bitfield of behavioral facets extracted from a parsed statement
/// (spec §4.1). Bit values are chosen to match the classic MaxScale
/// `QUERY_TYPE_*` constants this spec was distilled from, so that anyone
/// cross-referencing the original source recognizes them immediately.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TypeMask(u32);

macro_rules! bits {
    ($($name:ident = $val:expr, $doc:literal;)*) => {
        impl TypeMask {
            $(
                #[doc = $doc]
                pub const $name: TypeMask = TypeMask($val);
            )*
        }
    };
}

bits! {
    UNKNOWN            = 0x0000_0000, "Parser could not classify the statement; routers treat this as WRITE.";
    LOCAL_READ         = 0x0000_0001, "Read that can be answered without going to any backend.";
    READ               = 0x0000_0002, "Pure read of table data.";
    WRITE              = 0x0000_0004, "Modifies replicated data on the primary.";
    MASTER_READ        = 0x0000_0008, "Must read from the primary.";
    SESSION_WRITE      = 0x0000_0010, "Modifies per-connection session state; replayed on every backend.";
    USERVAR_READ       = 0x0000_0040, "Reads a user-defined variable.";
    SYSVAR_READ        = 0x0000_0080, "Reads a session system variable.";
    GSYSVAR_READ       = 0x0000_0200, "Reads a global system variable.";
    GSYSVAR_WRITE      = 0x0000_0400, "Writes a global system variable (also covers uservar writes, see Open Questions).";
    BEGIN_TRX          = 0x0000_0800, "BEGIN or START TRANSACTION.";
    ENABLE_AUTOCOMMIT  = 0x0000_1000, "SET autocommit=1.";
    DISABLE_AUTOCOMMIT = 0x0000_2000, "SET autocommit=0.";
    ROLLBACK           = 0x0000_4000, "ROLLBACK.";
    COMMIT             = 0x0000_8000, "COMMIT, or a statement causing an implicit commit.";
    PREPARE_NAMED_STMT = 0x0001_0000, "PREPARE name FROM ...";
    PREPARE_STMT       = 0x0002_0000, "Wire-level prepare packet.";
    EXEC_STMT          = 0x0004_0000, "Wire-level execute packet.";
    CREATE_TMP_TABLE   = 0x0008_0000, "CREATE TEMPORARY TABLE.";
    READ_TMP_TABLE     = 0x0010_0000, "Reads a table previously created as temporary in this session.";
    SHOW_DATABASES     = 0x0020_0000, "SHOW DATABASES.";
    SHOW_TABLES        = 0x0040_0000, "SHOW TABLES.";
}

impl TypeMask {
    pub const fn empty() -> Self {
        TypeMask(0)
    }

    pub fn contains(&self, other: TypeMask) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    pub fn intersects(&self, other: TypeMask) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn insert(&mut self, other: TypeMask) {
        self.0 |= other.0;
    }

    pub fn union(self, other: TypeMask) -> Self {
        TypeMask(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = TypeMask;
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for TypeMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

const NAMED_BITS: &[(TypeMask, &str)] = &[
    (TypeMask::LOCAL_READ, "LOCAL_READ"),
    (TypeMask::READ, "READ"),
    (TypeMask::WRITE, "WRITE"),
    (TypeMask::MASTER_READ, "MASTER_READ"),
    (TypeMask::SESSION_WRITE, "SESSION_WRITE"),
    (TypeMask::USERVAR_READ, "USERVAR_READ"),
    (TypeMask::SYSVAR_READ, "SYSVAR_READ"),
    (TypeMask::GSYSVAR_READ, "GSYSVAR_READ"),
    (TypeMask::GSYSVAR_WRITE, "GSYSVAR_WRITE"),
    (TypeMask::BEGIN_TRX, "BEGIN_TRX"),
    (TypeMask::ENABLE_AUTOCOMMIT, "ENABLE_AUTOCOMMIT"),
    (TypeMask::DISABLE_AUTOCOMMIT, "DISABLE_AUTOCOMMIT"),
    (TypeMask::ROLLBACK, "ROLLBACK"),
    (TypeMask::COMMIT, "COMMIT"),
    (TypeMask::PREPARE_NAMED_STMT, "PREPARE_NAMED_STMT"),
    (TypeMask::PREPARE_STMT, "PREPARE_STMT"),
    (TypeMask::EXEC_STMT, "EXEC_STMT"),
    (TypeMask::CREATE_TMP_TABLE, "CREATE_TMP_TABLE"),
    (TypeMask::READ_TMP_TABLE, "READ_TMP_TABLE"),
    (TypeMask::SHOW_DATABASES, "SHOW_DATABASES"),
    (TypeMask::SHOW_TABLES, "SHOW_TABLES"),
];

impl fmt::Display for TypeMask {
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
