use once_cell::sync::Lazy;
use regex::Regex;

use crate::shardwire::qc::canonical::canonicalize;
use crate::shardwire::qc::operation::Operation;
use crate::shardwire::qc::type_mask::TypeMask;

/// Distinguishes the wire packet kind carrying the statement, needed because
/// rule 10 (spec §4.1) treats a textual `PREPARE name FROM ...` differently
/// from the wire-level prepare/execute packets used by the binary protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PacketKind {
    Query,
    StmtPrepare,
    StmtExecute,
}

#[derive(Debug, Clone)]
pub struct ClassifyResult {
    pub type_mask: TypeMask,
    pub operation: Operation,
    pub referenced_dbs: Vec<String>,
    pub referenced_tables: Vec<String>,
    pub created_table_name: Option<String>,
    pub canonical_form: String,
}

/// `classify(statement_bytes) -> (type_mask, operation, referenced_dbs, referenced_tables, created_table_name, canonical_form)`
/// (spec §4.1 Contract). Never fails: an unparseable statement yields
/// `TypeMask::UNKNOWN` and callers (the routers) then treat it as WRITE.
pub fn classify(statement_bytes: &[u8], packet_kind: PacketKind) -> ClassifyResult {
    let raw = String::from_utf8_lossy(statement_bytes).trim().to_string();
    if raw.is_empty() {
        return ClassifyResult {
            type_mask: TypeMask::UNKNOWN,
            operation: Operation::Other,
            referenced_dbs: Vec::new(),
            referenced_tables: Vec::new(),
            created_table_name: None,
            canonical_form: String::new(),
        };
    }

    let canonical_form = canonicalize(&raw);
    let upper = raw.to_uppercase();
    let operation = Operation::from_uppercased(upper.trim());

    let mut mask = TypeMask::empty();

    // Rule 1: SELECT ... INTO OUTFILE|DUMPFILE|@var
    if operation == Operation::SelectInto || is_select_into(&upper) {
        mask |= TypeMask::SESSION_WRITE;
    }

    // Rule 2: implicit-commit DDL, CREATE USER, autocommit toggles.
    if causes_implicit_commit(operation, &upper) {
        mask |= TypeMask::COMMIT;
    }
    if let Some(autocommit_on) = autocommit_toggle(&upper) {
        if autocommit_on {
            mask |= TypeMask::ENABLE_AUTOCOMMIT;
        } else {
            mask |= TypeMask::DISABLE_AUTOCOMMIT | TypeMask::BEGIN_TRX;
        }
    }

    // Rule 3: SET GLOBAL / SHOW GLOBAL VARIABLES
    if operation == Operation::SetGlobal {
        mask |= TypeMask::GSYSVAR_WRITE;
    } else if operation == Operation::Show && upper.contains("GLOBAL") && upper.contains("VARIABLES") {
        mask |= TypeMask::GSYSVAR_READ;
    }

    // Rule 4: SET SESSION / SHOW [SESSION] VARIABLES
    if operation == Operation::SetSession {
        mask |= TypeMask::SYSVAR_READ | TypeMask::GSYSVAR_WRITE;
    } else if operation == Operation::Show && upper.contains("VARIABLES") && !upper.contains("GLOBAL") {
        mask |= TypeMask::SYSVAR_READ;
    } else if operation == Operation::Set {
        // A bare `SET` (user variables, `SET NAMES`, `SET CHARACTER SET`, ...)
        // mutates connection-local state that isn't GLOBAL or SESSION scoped
        // but still must be replayed to every backend a session touches.
        mask |= TypeMask::SESSION_WRITE;
    }

    let mut created_table_name = None;

    // Rule 5: DML/DDL touching replicated tables.
    if is_write_operation(operation) {
        mask |= TypeMask::WRITE;
        if operation == Operation::CreateTemporaryTable {
            mask |= TypeMask::CREATE_TMP_TABLE;
            created_table_name = extract_created_table_name(&raw);
        }
    }

    // Rule 6: USE db, DEALLOCATE PREPARE
    if operation == Operation::Use || operation == Operation::Deallocate {
        mask |= TypeMask::SESSION_WRITE;
    }

    // Rule 7: SELECT, scanning referenced functions.
    if matches!(operation, Operation::Select | Operation::SelectInto) {
        mask |= TypeMask::READ;
        mask |= scan_select_functions(&upper);
    }

    // Rule 8: CALL
    if operation == Operation::Call {
        mask |= TypeMask::WRITE;
    }

    // Rule 9: transaction keywords.
    match operation {
        Operation::Begin => mask |= TypeMask::BEGIN_TRX,
        Operation::Commit => mask |= TypeMask::COMMIT,
        Operation::Rollback => mask |= TypeMask::ROLLBACK,
        _ => {}
    }

    // Rule 10: prepared statement lifecycle.
    if operation == Operation::Prepare {
        mask |= TypeMask::PREPARE_NAMED_STMT;
    }
    match packet_kind {
        PacketKind::StmtPrepare => mask |= TypeMask::PREPARE_STMT,
        PacketKind::StmtExecute => mask |= TypeMask::EXEC_STMT,
        PacketKind::Query => {}
    }

    if operation == Operation::Show {
        if upper.starts_with("SHOW DATABASES") {
            mask |= TypeMask::SHOW_DATABASES;
        } else if upper.contains("SHOW TABLES") {
            mask |= TypeMask::SHOW_TABLES;
        }
    }

    if mask.is_empty() && operation == Operation::Other {
        mask = TypeMask::UNKNOWN;
    }

    let (referenced_dbs, referenced_tables) = extract_references(&raw, operation);

    ClassifyResult {
        type_mask: mask,
        operation,
        referenced_dbs,
        referenced_tables,
        created_table_name,
        canonical_form,
    }
}

fn is_select_into(upper: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"SELECT\b.*\bINTO\s+(OUTFILE|DUMPFILE|@)").unwrap()
    });
    RE.is_match(upper)
}

fn causes_implicit_commit(operation: Operation, upper: &str) -> bool {
    matches!(
        operation,
        Operation::Create | Operation::Alter | Operation::Drop | Operation::Truncate
            | Operation::Lock | Operation::Grant | Operation::Revoke
    ) && operation != Operation::CreateTemporaryTable
        || upper.starts_with("CREATE USER")
        || upper.starts_with("DROP USER")
        || upper.starts_with("RENAME TABLE")
}

fn autocommit_toggle(upper: &str) -> Option<bool> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^SET\s+(SESSION\s+|@@)?(SESSION\.)?AUTOCOMMIT\s*=\s*'?(0|1|ON|OFF|TRUE|FALSE)'?").unwrap()
    });
    let caps = RE.captures(upper.trim())?;
    let val = caps.get(3)?.as_str();
    Some(matches!(val, "1" | "ON" | "TRUE"))
}

fn is_write_operation(operation: Operation) -> bool {
    matches!(
        operation,
        Operation::Insert
            | Operation::Update
            | Operation::Delete
            | Operation::Replace
            | Operation::Create
            | Operation::CreateTemporaryTable
            | Operation::Alter
            | Operation::Drop
            | Operation::Truncate
    )
}

fn scan_select_functions(upper: &str) -> TypeMask {
    static LOCAL_FN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\b(NOW|CURDATE|CURTIME|SYSDATE|UNIX_TIMESTAMP|REPEAT|RAND|UUID|CONCAT|SUBSTRING)\s*\(").unwrap()
    });
    static MASTER_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bLAST_INSERT_ID\s*\(").unwrap());
    static SYSVAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"@@[A-Z_.]+").unwrap());
    static USERVAR_READ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:[^:]|^)@[A-Za-z_][A-Za-z0-9_]*").unwrap());
    static USERVAR_ASSIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[A-Za-z_][A-Za-z0-9_]*\s*:=").unwrap());
    static UNKNOWN_FN_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z_][A-Z0-9_]*)\s*\(").unwrap());

    const KNOWN_BUILTINS: &[&str] = &[
        "COUNT", "SUM", "AVG", "MIN", "MAX", "NOW", "CURDATE", "CURTIME", "SYSDATE",
        "UNIX_TIMESTAMP", "REPEAT", "RAND", "UUID", "CONCAT", "SUBSTRING", "LAST_INSERT_ID",
        "COALESCE", "IFNULL", "IF", "CAST", "CONVERT", "LENGTH", "LOWER", "UPPER", "TRIM",
        "DATE", "DATE_FORMAT", "ROUND", "ABS", "FLOOR", "CEIL", "CEILING",
    ];

    let mut mask = TypeMask::empty();
    if LOCAL_FN.is_match(upper) {
        mask |= TypeMask::LOCAL_READ;
    }
    if MASTER_FN.is_match(upper) {
        mask |= TypeMask::MASTER_READ;
    }
    if SYSVAR.is_match(upper) {
        mask |= TypeMask::SYSVAR_READ;
    }
    if USERVAR_ASSIGN.is_match(upper) {
        mask |= TypeMask::GSYSVAR_WRITE;
    } else if USERVAR_READ.is_match(upper) {
        mask |= TypeMask::USERVAR_READ;
    }
    for caps in UNKNOWN_FN_CALL.captures_iter(upper) {
        let name = caps.get(1).unwrap().as_str();
        if !KNOWN_BUILTINS.contains(&name) {
            // Rule 7: a stored-procedure or unknown function reference implies WRITE,
            // since we can't prove it's side-effect free.
            mask |= TypeMask::WRITE;
            break;
        }
    }
    mask
}

fn extract_created_table_name(raw: &str) -> Option<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)CREATE\s+TEMPORARY\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?`?([A-Za-z0-9_.]+)`?").unwrap()
    });
    RE.captures(raw).map(|c| c[1].to_string())
}

/// Extracts database and table names referenced by FROM/JOIN/INTO/UPDATE/
/// table-DDL clauses. This is a lexical approximation (no full SQL parser,
/// per spec §1 non-goals), sufficient for the schema router's per-statement
/// shard lookup (spec §4.5).
fn extract_references(raw: &str, operation: Operation) -> (Vec<String>, Vec<String>) {
    static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE|TABLE)\s+`?([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?)`?").unwrap()
    });

    let mut dbs = Vec::new();
    let mut tables = Vec::new();
    for caps in TABLE_REF.captures_iter(raw) {
        let full = caps[1].to_string();
        if let Some((db, table)) = full.split_once('.') {
            push_unique(&mut dbs, db.to_string());
            push_unique(&mut tables, table.to_string());
        } else {
            push_unique(&mut tables, full);
        }
    }

    if operation == Operation::Use {
        if let Some(db) = raw.split_whitespace().nth(1) {
            push_unique(&mut dbs, db.trim_matches(|c| c == '`' || c == ';').to_string());
        }
    }

    (dbs, tables)
}

fn push_unique(v: &mut Vec<String>, item: String) {
    if !v.contains(&item) {
        v.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_set_uservar() {
        let r = classify(b"SET @a=1", PacketKind::Query);
        assert!(r.type_mask.contains(TypeMask::SESSION_WRITE) || r.type_mask.contains(TypeMask::GSYSVAR_WRITE));
    }

    #[test]
    fn classifies_plain_select_as_read() {
        let r = classify(b"SELECT @a", PacketKind::Query);
        assert!(r.type_mask.contains(TypeMask::READ));
        assert!(r.type_mask.contains(TypeMask::USERVAR_READ));
    }

    #[test]
    fn classifies_transaction_boundaries() {
        assert!(classify(b"BEGIN", PacketKind::Query).type_mask.contains(TypeMask::BEGIN_TRX));
        assert!(classify(b"COMMIT", PacketKind::Query).type_mask.contains(TypeMask::COMMIT));
        assert!(classify(b"ROLLBACK", PacketKind::Query).type_mask.contains(TypeMask::ROLLBACK));
    }

    #[test]
    fn classifies_last_insert_id_as_master_read() {
        let r = classify(b"SELECT LAST_INSERT_ID()", PacketKind::Query);
        assert!(r.type_mask.contains(TypeMask::MASTER_READ));
    }

    #[test]
    fn classifies_create_temporary_table() {
        let r = classify(b"CREATE TEMPORARY TABLE tmp(id INT)", PacketKind::Query);
        assert!(r.type_mask.contains(TypeMask::WRITE));
        assert!(r.type_mask.contains(TypeMask::CREATE_TMP_TABLE));
        assert_eq!(r.created_table_name.as_deref(), Some("tmp"));
    }

    #[test]
    fn classifies_use_as_session_write_and_extracts_db() {
        let r = classify(b"USE shard_b", PacketKind::Query);
        assert!(r.type_mask.contains(TypeMask::SESSION_WRITE));
        assert_eq!(r.referenced_dbs, vec!["shard_b".to_string()]);
    }

    #[test]
    fn unparseable_statement_is_unknown() {
        let r = classify(b"", PacketKind::Query);
        assert_eq!(r.type_mask, TypeMask::UNKNOWN);
    }

    #[test]
    fn extracts_cross_db_table_reference() {
        let r = classify(b"SELECT * FROM shard_a.customers c JOIN shard_b.orders o ON c.id=o.customer_id", PacketKind::Query);
        assert_eq!(r.referenced_dbs, vec!["shard_a".to_string(), "shard_b".to_string()]);
    }
}
