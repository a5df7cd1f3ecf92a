use strum::Display;

/// The statement's leading keyword, classified the same way the teacher's
/// `QueryType` does it: a single pass over the first word(s) of the
/// canonicalized-to-uppercase statement. This drives which rule in spec
/// §4.1's classification order applies, but is reported separately from
/// `TypeMask` since routers key off the mask, not the keyword.
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum Operation {
    Other,
    Select,
    SelectInto,
    Insert,
    Update,
    Delete,
    Replace,
    Use,
    Show,
    Set,
    SetGlobal,
    SetSession,
    Begin,
    Commit,
    Rollback,
    Create,
    CreateTemporaryTable,
    Alter,
    Drop,
    Truncate,
    Call,
    Prepare,
    Deallocate,
    Execute,
    Lock,
    Unlock,
    Grant,
    Revoke,
}

impl Operation {
    /// Classifies the leading keyword(s) of an already-uppercased, trimmed statement.
    pub fn from_uppercased(s: &str) -> Self {
        if s.is_empty() {
            return Operation::Other;
        }
        let first_word = s.split(|c: char| c.is_whitespace() || c == '(').next().unwrap_or("");
        match first_word {
            "SELECT" => {
                if after(s, "SELECT").trim_start().starts_with("INTO") {
                    Operation::SelectInto
                } else {
                    Operation::Select
                }
            }
            "INSERT" => Operation::Insert,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            "REPLACE" => Operation::Replace,
            "USE" => Operation::Use,
            "SHOW" => Operation::Show,
            "SET" => {
                let rest = after(s, "SET").trim_start();
                if rest.starts_with("GLOBAL") {
                    Operation::SetGlobal
                } else if rest.starts_with("SESSION") || rest.starts_with("@@SESSION") {
                    Operation::SetSession
                } else {
                    Operation::Set
                }
            }
            "BEGIN" | "START" => Operation::Begin,
            "COMMIT" | "END" => Operation::Commit,
            "ROLLBACK" => Operation::Rollback,
            "CREATE" => {
                if s.contains("TEMPORARY TABLE") {
                    Operation::CreateTemporaryTable
                } else {
                    Operation::Create
                }
            }
            "ALTER" => Operation::Alter,
            "DROP" => Operation::Drop,
            "TRUNCATE" => Operation::Truncate,
            "CALL" => Operation::Call,
            "PREPARE" => Operation::Prepare,
            "DEALLOCATE" => Operation::Deallocate,
            "EXECUTE" => Operation::Execute,
            "LOCK" => Operation::Lock,
            "UNLOCK" => Operation::Unlock,
            "GRANT" => Operation::Grant,
            "REVOKE" => Operation::Revoke,
            _ => Operation::Other,
        }
    }
}

fn after<'a>(s: &'a str, prefix: &str) -> &'a str {
    &s[prefix.len().min(s.len())..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_keywords() {
        assert_eq!(Operation::from_uppercased("SELECT 1"), Operation::Select);
        assert_eq!(Operation::from_uppercased("SELECT ... INTO @X"), Operation::SelectInto);
        assert_eq!(Operation::from_uppercased("CREATE TEMPORARY TABLE T(ID INT)"), Operation::CreateTemporaryTable);
        assert_eq!(Operation::from_uppercased("SET GLOBAL X=1"), Operation::SetGlobal);
        assert_eq!(Operation::from_uppercased("START TRANSACTION"), Operation::Begin);
    }
}
