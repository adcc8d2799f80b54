//! Local validators for database instance requests.
//!
//! Each validator maps raw operator text to a typed value or a reason
//! string, ready to be driven by [`crate::prompt::ValidationLoop`].

pub const MIN_SIZE_GB: u32 = 5;
pub const MAX_SIZE_GB: u32 = 1024;

/// Naming rules shown before an interactive instance create.
pub const RULES_TEXT: &str = "\
*************************************************
Ok, here are the rules on creating instances:

instance id:
  Each instance needs an identifier. This is the name
  of the virtual machine created for you. Rules are
  1-63 letters, digits or hyphens, first must be a
  letter, no trailing or double hyphens, must be
  unique to this account.

size:
  The maximum size of your database in GB. Enter an
  integer between 5-1024

master username:
  The username you will use to connect. Rules are
  1-16 alphanumeric characters, first must be a letter,
  cannot be a reserved MySQL word/phrase

master password:
  Rules are 8-41 printable characters, not /, \" or @

database name:
  The name for the first database on this instance. Rules are
  1-64 alphanumeric characters, first must be a letter,
  cannot be a reserved MySQL word
*************************************************";

/// Schemas every MySQL server carries; never offered as a working database.
pub const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "innodb", "mysql", "performance_schema"];

const RESERVED_WORDS: &[&str] = &[
    "add", "all", "alter", "analyze", "and", "as", "asc", "before", "between", "both", "by",
    "call", "cascade", "case", "change", "check", "column", "condition", "constraint",
    "continue", "create", "cross", "cursor", "database", "databases", "declare", "default",
    "delete", "desc", "describe", "distinct", "drop", "each", "else", "exists", "exit",
    "explain", "false", "fetch", "for", "force", "foreign", "from", "grant", "group",
    "having", "if", "ignore", "in", "index", "inner", "insert", "interval", "into", "is",
    "join", "key", "keys", "kill", "leading", "leave", "left", "like", "limit", "lines",
    "load", "lock", "loop", "match", "natural", "not", "null", "on", "option", "or",
    "order", "outer", "primary", "procedure", "purge", "range", "read", "references",
    "rename", "repeat", "replace", "require", "restrict", "return", "revoke", "right",
    "schema", "schemas", "select", "set", "show", "sql", "table", "then", "to",
    "trigger", "true", "undo", "union", "unique", "unlock", "update", "usage", "use",
    "using", "values", "when", "where", "while", "with", "write",
];

fn is_reserved(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    RESERVED_WORDS.contains(&lower.as_str())
}

pub fn validate_instance_id(raw: &str) -> Result<String, String> {
    let id = raw.trim();
    if id.is_empty() || id.len() > 63 {
        return Err("instance id must be 1-63 characters.".to_string());
    }
    if !id.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err("instance id must start with a letter.".to_string());
    }
    if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-') {
        return Err("instance id may only contain letters, digits and hyphens.".to_string());
    }
    if id.ends_with('-') || id.contains("--") {
        return Err("instance id cannot end with a hyphen or contain two consecutive hyphens.".to_string());
    }
    Ok(id.to_string())
}

pub fn validate_size(raw: &str) -> Result<u32, String> {
    let reason = || format!("size must be an integer between {MIN_SIZE_GB} and {MAX_SIZE_GB}.");
    let size: u32 = raw.trim().parse().map_err(|_| reason())?;
    if (MIN_SIZE_GB..=MAX_SIZE_GB).contains(&size) {
        Ok(size)
    } else {
        Err(reason())
    }
}

pub fn validate_username(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() || name.len() > 16 {
        return Err("username must be 1-16 characters.".to_string());
    }
    if !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err("username must start with a letter.".to_string());
    }
    if !name.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err("username may only contain letters and digits.".to_string());
    }
    if is_reserved(name) {
        return Err(format!("username cannot be the reserved MySQL word {name:?}."));
    }
    Ok(name.to_string())
}

/// Passwords are taken verbatim; surrounding whitespace is not trimmed.
pub fn validate_password(raw: &str) -> Result<String, String> {
    let length = raw.chars().count();
    if !(8..=41).contains(&length) {
        return Err("password must be 8-41 characters.".to_string());
    }
    if !raw.chars().all(|ch| ch.is_ascii_graphic() || ch == ' ') {
        return Err("password may only contain printable ASCII characters.".to_string());
    }
    if raw.contains(['/', '"', '@']) {
        return Err("password cannot contain /, \" or @.".to_string());
    }
    Ok(raw.to_string())
}

pub fn validate_dbname(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() || name.len() > 64 {
        return Err("database name must be 1-64 characters.".to_string());
    }
    if !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err("database name must start with a letter.".to_string());
    }
    if !name.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err("database name may only contain letters and digits.".to_string());
    }
    if is_reserved(name) {
        return Err(format!("database name cannot be the reserved MySQL word {name:?}."));
    }
    Ok(name.to_string())
}
