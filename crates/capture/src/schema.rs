//! Change log DDL and queries for PostgreSQL
//!
//! Everything here is idempotent: the table and index use `IF NOT EXISTS`, the
//! capture function is `CREATE OR REPLACE`, and each trigger is dropped and
//! recreated inside the installation transaction.

use contracts::{is_valid_table_name, ContractError};

/// Change log table name
pub const EVENT_TABLE: &str = "tablecast_event";

/// Capture procedure name
pub const CAPTURE_FUNCTION: &str = "tablecast_capture_event";

pub const CREATE_EVENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "tablecast_event" (
    "id" BIGSERIAL PRIMARY KEY,
    "op" CHAR(1) NOT NULL,
    "table" VARCHAR(255) NOT NULL,
    "row" JSONB NOT NULL,
    "ts" BIGINT NOT NULL,
    "delivered" BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS "tablecast_event_undelivered_idx"
    ON "tablecast_event" ("ts", "id")
    WHERE NOT "delivered";
"#;

// Tables outside `public` are recorded schema-qualified.
pub const CREATE_CAPTURE_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION "tablecast_capture_event"()
RETURNS TRIGGER
AS $$
DECLARE
    source_table TEXT;
    captured_at BIGINT;
BEGIN
    IF (TG_TABLE_SCHEMA = 'public') THEN
        source_table := TG_TABLE_NAME;
    ELSE
        source_table := TG_TABLE_SCHEMA || '.' || TG_TABLE_NAME;
    END IF;

    captured_at := (extract(epoch from clock_timestamp()) * 1000)::BIGINT;

    IF (TG_OP = 'DELETE') THEN
        INSERT INTO "tablecast_event" ("op", "table", "row", "ts")
        VALUES ('D', source_table, row_to_json(OLD.*)::JSONB, captured_at);
    ELSIF (TG_OP = 'UPDATE') THEN
        INSERT INTO "tablecast_event" ("op", "table", "row", "ts")
        VALUES ('U', source_table, row_to_json(NEW.*)::JSONB, captured_at);
    ELSIF (TG_OP = 'INSERT') THEN
        INSERT INTO "tablecast_event" ("op", "table", "row", "ts")
        VALUES ('I', source_table, row_to_json(NEW.*)::JSONB, captured_at);
    END IF;

    RETURN NULL;
END
$$ LANGUAGE plpgsql;
"#;

pub const FETCH_UNDELIVERED: &str = r#"
SELECT
    e."id",
    e."op",
    e."table",
    e."row"::TEXT,
    e."ts"
FROM
    "tablecast_event" e
WHERE
    e."delivered" = FALSE
ORDER BY
    e."ts" ASC,
    e."id" ASC
LIMIT
    $1::BIGINT
"#;

pub const MARK_DELIVERED: &str = r#"
UPDATE
    "tablecast_event"
SET
    "delivered" = TRUE
WHERE
    "id" = $1
"#;

/// Quote a plain or schema-qualified table name
///
/// # Errors
/// Rejects anything that is not `[A-Za-z_][A-Za-z0-9_]*`, optionally with one
/// schema prefix.
pub fn quote_table(table: &str) -> Result<String, ContractError> {
    if !is_valid_table_name(table) {
        return Err(ContractError::provisioning(format!(
            "'{table}' is not a valid table identifier"
        )));
    }
    Ok(table
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

/// Trigger name bound to one monitored table
pub fn trigger_name(table: &str) -> String {
    format!("tablecast_{}_capture", table.replace('.', "_"))
}

/// Statements to install the trigger for one table
pub fn trigger_statement(table: &str) -> Result<String, ContractError> {
    let quoted = quote_table(table)?;
    let trigger = trigger_name(table);
    Ok(format!(
        "DROP TRIGGER IF EXISTS \"{trigger}\" ON {quoted};\n\
         CREATE TRIGGER \"{trigger}\"\n    \
         AFTER INSERT OR UPDATE OR DELETE ON {quoted}\n    \
         FOR EACH ROW EXECUTE FUNCTION \"{CAPTURE_FUNCTION}\"();"
    ))
}

/// Full installation script, in execution order
pub fn install_statements(tables: &[String]) -> Result<Vec<String>, ContractError> {
    let mut statements = Vec::with_capacity(tables.len() + 2);
    statements.push(CREATE_EVENT_TABLE.to_string());
    statements.push(CREATE_CAPTURE_FUNCTION.to_string());
    for table in tables {
        statements.push(trigger_statement(table)?);
    }
    Ok(statements)
}
