//! Identifier qualification: schema validation, table references and the
//! INFORMATION_SCHEMA views served from the catalog store.

use sqlparser::ast::{Ident, ObjectName, ObjectNamePart};

use crate::catalog::store::{self, InfoSchemaTable};
use crate::catalog::SCHEMA_SENTINEL;
use crate::error::{DriverError, Result};
use crate::ident;
use crate::session::Session;

pub const INFORMATION_SCHEMA: &str = "information_schema";

/// What a table name in a statement refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// A user table, by the name the client wrote.
    User(String),
    InfoSchema(&'static InfoSchemaTable),
}

pub fn is_information_schema(name: &str) -> bool {
    ident::eq(name, INFORMATION_SCHEMA)
}

pub fn part_name(part: &ObjectNamePart) -> Result<String> {
    match part {
        ObjectNamePart::Identifier(i) => Ok(i.value.clone()),
        #[allow(unreachable_patterns)]
        other => Err(DriverError::not_supported(format!("identifier > {other}"))),
    }
}

pub fn object_parts(name: &ObjectName) -> Result<Vec<String>> {
    name.0.iter().map(part_name).collect()
}

/// Checks a schema qualifier: only the configured schema and
/// `information_schema` exist.
pub fn check_schema(session: &Session, schema: &str) -> Result<()> {
    if session.is_main_schema(schema) || is_information_schema(schema) {
        Ok(())
    } else {
        Err(DriverError::AccessDenied(session.user.clone(), schema.to_string()))
    }
}

/// Resolves a `[schema.]table` reference.
pub fn resolve_table(session: &Session, name: &ObjectName) -> Result<TableRef> {
    let parts = object_parts(name)?;
    let (schema, table) = match parts.as_slice() {
        [table] => (None, table.clone()),
        [schema, table] => (Some(schema.clone()), table.clone()),
        _ => {
            return Err(DriverError::not_supported(format!(
                "table reference > {}-part name '{name}'",
                parts.len()
            )))
        }
    };
    ident::validate(&table)?;
    let schema = match schema {
        Some(s) => {
            check_schema(session, &s)?;
            s
        }
        None => session.current_db.clone().ok_or(DriverError::NoDatabase)?,
    };
    if is_information_schema(&schema) {
        return store::info_schema_table(&table)
            .map(TableRef::InfoSchema)
            .ok_or(DriverError::UnknownSystemTable(table));
    }
    Ok(TableRef::User(table))
}

/// Resolves a reference that must name a user table, such as a DML target.
pub fn user_table(session: &Session, name: &ObjectName) -> Result<String> {
    match resolve_table(session, name)? {
        TableRef::User(t) => Ok(t),
        TableRef::InfoSchema(_) => Err(DriverError::AccessDenied(
            session.user.clone(),
            INFORMATION_SCHEMA.to_string(),
        )),
    }
}

/// Column reference parts after dropping a validated schema qualifier.
pub fn column_parts<'a>(session: &Session, idents: &'a [Ident]) -> Result<&'a [Ident]> {
    match idents {
        [schema, _, _] => {
            check_schema(session, &schema.value)?;
            Ok(&idents[1..])
        }
        [_, _, _, ..] => Err(DriverError::not_supported(format!(
            "column reference > {}-part name",
            idents.len()
        ))),
        _ => Ok(idents),
    }
}

/// Subquery over the catalog store that presents one INFORMATION_SCHEMA
/// table, with the configured schema name in place of the stored sentinel.
pub fn info_schema_subquery(table: &InfoSchemaTable, database: &str) -> String {
    let db = ident::string_literal(database);
    let sentinel = ident::string_literal(SCHEMA_SENTINEL);
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let alias = ident::quote(&c.to_ascii_uppercase());
            if table.schema_columns.contains(c) {
                format!("CASE WHEN {c} = {sentinel} THEN {db} ELSE {c} END AS {alias}")
            } else {
                format!("{c} AS {alias}")
            }
        })
        .collect();
    format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        store::physical(table, false)
    )
}

/// Names of the INFORMATION_SCHEMA tables, in MySQL's upper case.
pub fn info_schema_table_names() -> Vec<String> {
    store::ALL.iter().map(|t| t.name.to_ascii_uppercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SqlMode;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn name(text: &str) -> ObjectName {
        Parser::new(&MySqlDialect {})
            .try_with_sql(text)
            .unwrap()
            .parse_object_name(false)
            .unwrap()
    }

    fn session() -> Session {
        let mut s = Session::new(1, "app", SqlMode::empty());
        s.current_db = Some("app".into());
        s.user = "root".into();
        s
    }

    #[test]
    fn qualified_names_must_use_known_schemas() {
        let s = session();
        assert_eq!(resolve_table(&s, &name("app.users")).unwrap(), TableRef::User("users".into()));
        assert_eq!(resolve_table(&s, &name("`APP`.t")).unwrap(), TableRef::User("t".into()));
        assert!(matches!(
            resolve_table(&s, &name("information_schema.COLUMNS")).unwrap(),
            TableRef::InfoSchema(t) if t.name == "columns"
        ));
        assert!(matches!(
            resolve_table(&s, &name("other.t")),
            Err(DriverError::AccessDenied(..))
        ));
        assert!(matches!(
            resolve_table(&s, &name("information_schema.processlist")),
            Err(DriverError::UnknownSystemTable(_))
        ));
        assert!(matches!(
            resolve_table(&s, &name("`caf\u{e9}`")),
            Err(DriverError::NotSupported(_))
        ));
    }

    #[test]
    fn unqualified_names_need_a_current_database() {
        let mut s = session();
        s.current_db = None;
        assert!(matches!(resolve_table(&s, &name("t")), Err(DriverError::NoDatabase)));
        s.current_db = Some("information_schema".into());
        assert!(matches!(resolve_table(&s, &name("tables")), Ok(TableRef::InfoSchema(_))));
    }

    #[test]
    fn info_schema_subquery_substitutes_the_schema_name() {
        let sql = info_schema_subquery(&store::CHECK_CONSTRAINTS, "app");
        assert_eq!(
            sql,
            "SELECT constraint_catalog AS \"CONSTRAINT_CATALOG\", \
             CASE WHEN constraint_schema = 'main' THEN 'app' ELSE constraint_schema END AS \"CONSTRAINT_SCHEMA\", \
             constraint_name AS \"CONSTRAINT_NAME\", check_clause AS \"CHECK_CLAUSE\" \
             FROM _mysql_information_schema_check_constraints"
        );
    }
}
