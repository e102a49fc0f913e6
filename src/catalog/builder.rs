//! Catalog mutator: applies parsed DDL to the table model and persists the
//! result. Every entry point either writes a consistent set of rows or
//! fails with a schema-conflict error before writing anything.

use chrono::Utc;
use tracing::debug;

use super::ddl::{AlterAction, CheckSpec, ColumnSpec, ConstraintSpec, DefaultSpec, Position, TableOptions};
use super::store::CatalogStore;
use super::types::{default_collation, TypeClass};
use super::{
    CheckInfo, ColumnInfo, ForeignKeyInfo, IndexInfo, IndexKind, KeyPart, TableSchema,
    DEFAULT_COLLATION,
};
use crate::error::{DriverError, Result};
use crate::ident;

/// Result of an ALTER TABLE: the new model plus what the physical rebuild
/// needs to carry data over.
#[derive(Debug, Clone)]
pub struct AlterOutcome {
    pub schema: TableSchema,
    /// Name the table had before the statement.
    pub previous_name: String,
    /// For each column of the new table, the old column it is copied from.
    pub sources: Vec<Option<String>>,
    pub needs_rebuild: bool,
}

pub struct Mutator<'e> {
    store: CatalogStore<'e>,
    foreign_key_checks: bool,
}

impl<'e> Mutator<'e> {
    pub fn new(store: CatalogStore<'e>, foreign_key_checks: bool) -> Self {
        Mutator {
            store,
            foreign_key_checks,
        }
    }

    pub fn store(&self) -> &CatalogStore<'e> {
        &self.store
    }

    pub fn record_create_table(
        &self,
        name: &str,
        temporary: bool,
        columns: &[ColumnSpec],
        constraints: &[ConstraintSpec],
        options: &TableOptions,
    ) -> Result<TableSchema> {
        ident::validate(name)?;
        if self.store.exists(name, temporary)? {
            return Err(DriverError::TableExists(name.to_string()));
        }
        let mut schema = TableSchema::new(name, temporary);
        schema.create_time = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        apply_options(&mut schema, options);

        let mut draft = Draft::new(schema);
        for spec in columns {
            draft.add_column(spec, Position::Last, None)?;
        }
        for spec in columns {
            self.add_inline_constraints(&mut draft, spec)?;
        }
        for constraint in constraints {
            self.add_constraint(&mut draft, constraint)?;
        }
        let schema = finish(draft)?.schema;
        self.store.write(&schema)?;
        debug!(table = %schema.name, columns = schema.columns.len(), "recorded CREATE TABLE");
        Ok(schema)
    }

    /// Copies the definition of `source` under a new name, as
    /// `CREATE TABLE .. LIKE` does. Foreign keys are not copied.
    pub fn record_create_like(&self, name: &str, temporary: bool, source: &TableSchema) -> Result<TableSchema> {
        ident::validate(name)?;
        if self.store.exists(name, temporary)? {
            return Err(DriverError::TableExists(name.to_string()));
        }
        let mut schema = source.clone();
        schema.name = name.to_string();
        schema.temporary = temporary;
        schema.auto_increment = None;
        schema.create_time = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        schema.foreign_keys.clear();
        let mut draft = Draft::new(TableSchema {
            checks: Vec::new(),
            ..schema.clone()
        });
        // Check names are schema-wide, so copies get fresh generated names.
        for check in &schema.checks {
            let spec = CheckSpec {
                name: None,
                clause: check.clause.clone(),
                enforced: check.enforced,
            };
            self.add_check(&mut draft, &spec)?;
        }
        let schema = finish(draft)?.schema;
        self.store.write(&schema)?;
        Ok(schema)
    }

    pub fn record_alter_table(&self, current: &TableSchema, actions: &[AlterAction]) -> Result<AlterOutcome> {
        let mut draft = Draft::new(current.clone());
        for action in actions {
            self.alter(&mut draft, action)?;
        }
        let outcome = finish(draft)?;
        if outcome.previous_name != outcome.schema.name {
            self.store.delete(&outcome.previous_name, current.temporary)?;
            self.store
                .rename_references(&outcome.previous_name, &outcome.schema.name, current.temporary)?;
        }
        self.store.write(&outcome.schema)?;
        debug!(table = %outcome.schema.name, rebuild = outcome.needs_rebuild, "recorded ALTER TABLE");
        Ok(outcome)
    }

    pub fn record_drop_table(&self, name: &str, temporary: bool) -> Result<()> {
        self.store.delete(name, temporary)
    }

    pub fn record_create_index(&self, current: &TableSchema, index: &ConstraintSpec) -> Result<TableSchema> {
        let mut draft = Draft::new(current.clone());
        self.add_constraint(&mut draft, index)?;
        let schema = finish(draft)?.schema;
        self.store.write(&schema)?;
        Ok(schema)
    }

    pub fn record_drop_index(&self, current: &TableSchema, name: &str) -> Result<TableSchema> {
        let mut draft = Draft::new(current.clone());
        self.alter(&mut draft, &AlterAction::DropIndex(name.to_string()))?;
        let schema = finish(draft)?.schema;
        self.store.write(&schema)?;
        Ok(schema)
    }

    pub fn record_rename_table(&self, current: &TableSchema, new_name: &str) -> Result<TableSchema> {
        ident::validate(new_name)?;
        let mut schema = current.clone();
        schema.name = new_name.to_string();
        self.store.delete(&current.name, current.temporary)?;
        self.store.write(&schema)?;
        self.store
            .rename_references(&current.name, new_name, current.temporary)?;
        Ok(schema)
    }

    fn alter(&self, draft: &mut Draft, action: &AlterAction) -> Result<()> {
        let table = draft.schema.name.clone();
        match action {
            AlterAction::AddColumn { column, position } => {
                draft.add_column(column, position.clone(), None)?;
                self.add_inline_constraints(draft, column)?;
                draft.needs_rebuild = true;
            }
            AlterAction::ChangeColumn {
                old,
                column,
                position,
            } => {
                let Some(idx) = draft.schema.column_position(old) else {
                    return Err(DriverError::UnknownColumn(old.clone(), table));
                };
                let new_name = column.column.name.clone();
                if !ident::eq(old, &new_name) {
                    draft.ensure_column_unused(&new_name)?;
                    draft.ensure_not_checked(old)?;
                }
                let stored_name = draft.schema.columns[idx].name.clone();
                let source = draft.remove_column_at(idx);
                // Keep the column's slot unless repositioned.
                let position = match position {
                    Position::Last if idx == 0 => Position::First,
                    Position::Last => Position::After(draft.schema.columns[idx - 1].name.clone()),
                    other => other.clone(),
                };
                draft.add_column(column, position, source)?;
                draft.rename_column_references(&stored_name, &new_name);
                self.add_inline_constraints(draft, column)?;
                draft.needs_rebuild = true;
            }
            AlterAction::DropColumn(name) => {
                draft.drop_column(name)?;
                draft.needs_rebuild = true;
            }
            AlterAction::RenameColumn { old, new } => {
                let Some(idx) = draft.schema.column_position(old) else {
                    return Err(DriverError::UnknownColumn(old.clone(), table));
                };
                if !ident::eq(old, new) {
                    draft.ensure_column_unused(new)?;
                    draft.ensure_not_checked(old)?;
                }
                ident::validate(new)?;
                let stored = std::mem::replace(&mut draft.schema.columns[idx].name, new.clone());
                draft.rename_column_references(&stored, new);
                draft.needs_rebuild = true;
            }
            AlterAction::SetDefault { column, default } => {
                let Some(idx) = draft.schema.column_position(column) else {
                    return Err(DriverError::UnknownColumn(column.clone(), table));
                };
                let col = &mut draft.schema.columns[idx];
                set_default(col, Some(default))?;
                draft.needs_rebuild = true;
            }
            AlterAction::DropDefault(column) => {
                let Some(idx) = draft.schema.column_position(column) else {
                    return Err(DriverError::UnknownColumn(column.clone(), table));
                };
                let col = &mut draft.schema.columns[idx];
                col.default = None;
                col.default_generated = false;
                draft.needs_rebuild = true;
            }
            AlterAction::AddConstraint(constraint) => {
                if !matches!(constraint, ConstraintSpec::ForeignKey { .. }) {
                    draft.needs_rebuild = true;
                }
                self.add_constraint(draft, constraint)?;
            }
            AlterAction::DropPrimaryKey => {
                draft.drop_primary_key()?;
                draft.needs_rebuild = true;
            }
            AlterAction::DropIndex(name) => {
                if name.eq_ignore_ascii_case("PRIMARY") {
                    draft.drop_primary_key()?;
                } else {
                    draft.drop_index(name)?;
                }
                draft.needs_rebuild = true;
            }
            AlterAction::DropForeignKey(name) => {
                let before = draft.schema.foreign_keys.len();
                draft.schema.foreign_keys.retain(|fk| !ident::eq(&fk.name, name));
                if draft.schema.foreign_keys.len() == before {
                    return Err(DriverError::CantDrop(name.clone()));
                }
            }
            AlterAction::DropCheck(name) => {
                let before = draft.schema.checks.len();
                draft.schema.checks.retain(|c| !ident::eq(&c.name, name));
                if draft.schema.checks.len() == before {
                    return Err(DriverError::ConstraintNotFound(name.clone()));
                }
                draft.needs_rebuild = true;
            }
            AlterAction::DropConstraint(name) => {
                let pk = name.eq_ignore_ascii_case("PRIMARY") && draft.schema.primary_key().is_some();
                let unique = draft
                    .schema
                    .indexes
                    .iter()
                    .any(|i| i.unique && !i.is_primary() && ident::eq(&i.name, name));
                let fk = draft.schema.foreign_keys.iter().any(|f| ident::eq(&f.name, name));
                let check = draft.schema.checks.iter().any(|c| ident::eq(&c.name, name));
                let matches = [pk, unique, fk, check].iter().filter(|m| **m).count();
                if matches > 1 {
                    return Err(DriverError::AmbiguousConstraint(name.clone()));
                }
                let action = if pk {
                    AlterAction::DropPrimaryKey
                } else if unique {
                    AlterAction::DropIndex(name.clone())
                } else if fk {
                    AlterAction::DropForeignKey(name.clone())
                } else if check {
                    AlterAction::DropCheck(name.clone())
                } else {
                    return Err(DriverError::ConstraintNotFound(name.clone()));
                };
                self.alter(draft, &action)?;
            }
            AlterAction::SetEnforced { name, enforced } => {
                let Some(check) = draft.schema.checks.iter_mut().find(|c| ident::eq(&c.name, name)) else {
                    return Err(DriverError::ConstraintNotFound(name.clone()));
                };
                check.enforced = *enforced;
                draft.needs_rebuild = true;
            }
            AlterAction::SetIndexVisible { name, visible } => {
                let Some(index) = draft.schema.indexes.iter_mut().find(|i| ident::eq(&i.name, name)) else {
                    return Err(key_does_not_exist(name, &table));
                };
                if index.is_primary() && !visible {
                    return Err(DriverError::value(3522, "A primary key index cannot be invisible"));
                }
                index.visible = *visible;
            }
            AlterAction::RenameIndex { old, new } => {
                if old.eq_ignore_ascii_case("PRIMARY") || new.eq_ignore_ascii_case("PRIMARY") {
                    return Err(DriverError::WrongIndexName(
                        if old.eq_ignore_ascii_case("PRIMARY") { old } else { new }.clone(),
                    ));
                }
                if draft.schema.index(old).is_none() {
                    return Err(key_does_not_exist(old, &table));
                }
                if !ident::eq(old, new) && draft.schema.index(new).is_some() {
                    return Err(DriverError::DuplicateKeyName(new.clone()));
                }
                if let Some(index) = draft.schema.indexes.iter_mut().find(|i| ident::eq(&i.name, old)) {
                    index.name = new.clone();
                }
                draft.needs_rebuild = true;
            }
            AlterAction::RenameTable { name, .. } => {
                ident::validate(name)?;
                if !ident::eq(name, &draft.schema.name)
                    && self.store.exists(name, draft.schema.temporary)?
                {
                    return Err(DriverError::TableExists(name.clone()));
                }
                draft.schema.name = name.clone();
            }
            AlterAction::Options(options) => apply_options(&mut draft.schema, options),
            AlterAction::Ignored => {}
        }
        Ok(())
    }

    fn add_inline_constraints(&self, draft: &mut Draft, spec: &ColumnSpec) -> Result<()> {
        let name = spec.column.name.clone();
        if spec.primary_key {
            self.add_constraint(
                draft,
                &ConstraintSpec::PrimaryKey {
                    parts: vec![KeyPart::column(&name)],
                    comment: String::new(),
                },
            )?;
        }
        if spec.unique {
            self.add_constraint(
                draft,
                &ConstraintSpec::Unique {
                    name: None,
                    parts: vec![KeyPart::column(&name)],
                    comment: String::new(),
                    visible: true,
                },
            )?;
        }
        for check in &spec.checks {
            self.add_check(draft, check)?;
        }
        Ok(())
    }

    fn add_constraint(&self, draft: &mut Draft, constraint: &ConstraintSpec) -> Result<()> {
        match constraint {
            ConstraintSpec::PrimaryKey { parts, comment } => {
                if draft.schema.primary_key().is_some() {
                    return Err(DriverError::MultiplePrimaryKey);
                }
                if parts.iter().any(|p| p.column.is_none()) {
                    return Err(DriverError::value(3756, "The primary key cannot be a functional index"));
                }
                draft.check_key_parts(parts, IndexKind::Btree)?;
                draft.schema.indexes.insert(
                    0,
                    IndexInfo {
                        name: "PRIMARY".into(),
                        unique: true,
                        kind: IndexKind::Btree,
                        parts: parts.clone(),
                        comment: comment.clone(),
                        visible: true,
                    },
                );
            }
            ConstraintSpec::Unique {
                name,
                parts,
                comment,
                visible,
            } => draft.add_index(name.as_deref(), true, IndexKind::Btree, parts, comment, *visible)?,
            ConstraintSpec::Index {
                name,
                kind,
                parts,
                comment,
                visible,
            } => draft.add_index(name.as_deref(), false, *kind, parts, comment, *visible)?,
            ConstraintSpec::ForeignKey {
                name,
                index_name,
                columns,
                referenced_table,
                referenced_columns,
                on_delete,
                on_update,
            } => {
                let fk_name = match name {
                    Some(n) => {
                        ident::validate(n)?;
                        let taken = self.constraint_names(draft, "FOREIGN KEY")?;
                        if taken.iter().any(|t| ident::eq(t, n)) {
                            return Err(DriverError::DuplicateForeignKey(n.clone()));
                        }
                        n.clone()
                    }
                    None => {
                        let taken = self.constraint_names(draft, "FOREIGN KEY")?;
                        next_generated_name(&draft.schema.name, "ibfk", &taken)
                    }
                };
                if referenced_columns.is_empty() || referenced_columns.len() != columns.len() {
                    return Err(DriverError::value(
                        1239,
                        format!("Incorrect foreign key definition for '{fk_name}': Key reference and table reference don't match"),
                    ));
                }
                for column in columns {
                    if draft.schema.column(column).is_none() {
                        return Err(DriverError::KeyColumnNotFound(column.clone()));
                    }
                }
                self.check_referenced(draft, &fk_name, referenced_table, referenced_columns)?;

                let covered = draft.schema.indexes.iter().any(|i| {
                    let cols = i.column_names();
                    cols.len() >= columns.len()
                        && columns.iter().zip(&cols).all(|(a, b)| ident::eq(a, b))
                });
                if !covered {
                    let index = name.clone().or_else(|| index_name.clone());
                    let parts: Vec<KeyPart> = columns.iter().map(|c| KeyPart::column(c)).collect();
                    draft.add_index(index.as_deref(), false, IndexKind::Btree, &parts, "", true)?;
                }
                draft.schema.foreign_keys.push(ForeignKeyInfo {
                    name: fk_name,
                    columns: columns.clone(),
                    referenced_table: referenced_table.clone(),
                    referenced_columns: referenced_columns.clone(),
                    on_update: on_update.clone(),
                    on_delete: on_delete.clone(),
                });
            }
            ConstraintSpec::Check(check) => self.add_check(draft, check)?,
        }
        Ok(())
    }

    fn add_check(&self, draft: &mut Draft, check: &CheckSpec) -> Result<()> {
        let taken = self.constraint_names(draft, "CHECK")?;
        let name = match &check.name {
            Some(n) => {
                ident::validate(n)?;
                if taken.iter().any(|t| ident::eq(t, n)) {
                    return Err(DriverError::DuplicateCheck(n.clone()));
                }
                n.clone()
            }
            None => next_generated_name(&draft.schema.name, "chk", &taken),
        };
        draft.schema.checks.push(CheckInfo {
            name,
            clause: check.clause.clone(),
            enforced: check.enforced,
        });
        Ok(())
    }

    /// Names of a constraint kind across the schema: other tables' stored
    /// rows plus the table being edited.
    fn constraint_names(&self, draft: &Draft, kind: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .constraint_names(kind, draft.schema.temporary)?
            .into_iter()
            .filter(|(_, owner)| !ident::eq(owner, &draft.schema.name) && !ident::eq(owner, &draft.previous_name))
            .map(|(name, _)| name)
            .collect();
        match kind {
            "CHECK" => names.extend(draft.schema.checks.iter().map(|c| c.name.clone())),
            _ => names.extend(draft.schema.foreign_keys.iter().map(|f| f.name.clone())),
        }
        Ok(names)
    }

    fn check_referenced(
        &self,
        draft: &Draft,
        fk_name: &str,
        referenced_table: &str,
        referenced_columns: &[String],
    ) -> Result<()> {
        let parent = if ident::eq(referenced_table, &draft.schema.name) {
            Some(draft.schema.clone())
        } else {
            self.store.load_any(referenced_table)?
        };
        let Some(parent) = parent else {
            if self.foreign_key_checks {
                return Err(DriverError::value(
                    1824,
                    format!("Failed to open the referenced table '{referenced_table}'"),
                ));
            }
            return Ok(());
        };
        for column in referenced_columns {
            if parent.column(column).is_none() {
                return Err(DriverError::value(
                    3734,
                    format!(
                        "Failed to add the foreign key constraint. Missing column '{column}' for constraint '{fk_name}' in the referenced table '{referenced_table}'"
                    ),
                ));
            }
        }
        let indexed = parent.indexes.iter().any(|i| {
            let cols = i.column_names();
            cols.len() >= referenced_columns.len()
                && referenced_columns.iter().zip(&cols).all(|(a, b)| ident::eq(a, b))
        });
        if !indexed {
            return Err(DriverError::value(
                1822,
                format!(
                    "Failed to add the foreign key constraint. Missing index for constraint '{fk_name}' in the referenced table '{referenced_table}'"
                ),
            ));
        }
        Ok(())
    }
}

fn key_does_not_exist(name: &str, table: &str) -> DriverError {
    DriverError::value(1176, format!("Key '{name}' doesn't exist in table '{table}'"))
}

/// `<table>_<tag>_<n>` with `n` one past the highest suffix in use.
fn next_generated_name(table: &str, tag: &str, taken: &[String]) -> String {
    let prefix = ident::fold(&format!("{table}_{tag}_"));
    let highest = taken
        .iter()
        .filter_map(|name| {
            let folded = ident::fold(name);
            folded.strip_prefix(&prefix)?.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0);
    format!("{table}_{tag}_{}", highest + 1)
}

fn normalize_engine(engine: &str) -> String {
    match engine.to_ascii_lowercase().as_str() {
        "innodb" => "InnoDB".into(),
        "myisam" => "MyISAM".into(),
        "memory" | "heap" => "MEMORY".into(),
        "csv" => "CSV".into(),
        "archive" => "ARCHIVE".into(),
        _ => engine.to_string(),
    }
}

fn apply_options(schema: &mut TableSchema, options: &TableOptions) {
    if let Some(engine) = &options.engine {
        schema.engine = normalize_engine(engine);
    }
    match (&options.charset, &options.collation) {
        (_, Some(collation)) => schema.collation = collation.clone(),
        (Some(charset), None) => schema.collation = default_collation(charset),
        (None, None) => {}
    }
    if let Some(value) = options.auto_increment {
        schema.auto_increment = Some(value);
    }
    if let Some(comment) = &options.comment {
        schema.comment = comment.clone();
    }
    if let Some(row_format) = &options.row_format {
        let mut chars = row_format.to_ascii_lowercase().chars().collect::<Vec<_>>();
        if let Some(first) = chars.first_mut() {
            *first = first.to_ascii_uppercase();
        }
        schema.row_format = chars.into_iter().collect();
    }
}

fn set_default(column: &mut ColumnInfo, default: Option<&DefaultSpec>) -> Result<()> {
    let invalid = || DriverError::value(1067, format!("Invalid default value for '{}'", column.name));
    match default {
        None => {}
        Some(DefaultSpec::Null) => {
            if !column.nullable {
                return Err(invalid());
            }
            column.default = None;
            column.default_generated = false;
        }
        Some(DefaultSpec::Literal(value)) => {
            if column.ty.is_blob_or_text() || matches!(column.ty.class(), TypeClass::Json | TypeClass::Spatial) {
                return Err(DriverError::value(
                    1101,
                    format!(
                        "BLOB, TEXT, GEOMETRY or JSON column '{}' can't have a default value",
                        column.name
                    ),
                ));
            }
            if column.auto_increment {
                return Err(invalid());
            }
            let value = match column.ty.class() {
                TypeClass::Enum if !column.ty.members.iter().any(|m| m.eq_ignore_ascii_case(value)) => {
                    return Err(invalid())
                }
                TypeClass::Integer { .. } | TypeClass::Decimal { .. } | TypeClass::Float { .. }
                    if value.trim().parse::<f64>().is_err() =>
                {
                    return Err(invalid())
                }
                _ => value.clone(),
            };
            column.default = Some(value);
            column.default_generated = false;
        }
        Some(DefaultSpec::Expression(expr)) => {
            let is_now = expr.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP");
            if is_now && !matches!(column.ty.data_type.as_str(), "datetime" | "timestamp") {
                return Err(invalid());
            }
            column.default = Some(expr.clone());
            column.default_generated = true;
        }
    }
    Ok(())
}

fn column_from_spec(spec: &ColumnSpec, table_collation: &str) -> Result<ColumnInfo> {
    ident::validate(&spec.column.name)?;
    if spec.column.name.len() > 64 {
        return Err(DriverError::value(
            1059,
            format!("Identifier name '{}' is too long", spec.column.name),
        ));
    }
    let mut column = spec.column.clone();
    if column.auto_increment
        && !matches!(column.ty.class(), TypeClass::Integer { .. } | TypeClass::Float { .. })
    {
        return Err(DriverError::value(
            1063,
            format!("Incorrect column specifier for column '{}'", column.name),
        ));
    }
    if column.ty.is_textual() && !matches!(column.ty.class(), TypeClass::Json) {
        match (&column.ty.charset, &column.ty.collation) {
            (Some(charset), None) => column.ty.collation = Some(default_collation(charset)),
            (None, None) if table_collation != DEFAULT_COLLATION => {
                column.ty.collation = Some(table_collation.to_string())
            }
            _ => {}
        }
    }
    if column.generated.is_some() && spec.default.is_some() {
        return Err(DriverError::value(
            3105,
            format!(
                "The value specified for generated column '{}' in table is not allowed.",
                column.name
            ),
        ));
    }
    set_default(&mut column, spec.default.as_ref())?;
    Ok(column)
}

/// Table model under edit, with the copy source of every column.
struct Draft {
    schema: TableSchema,
    previous_name: String,
    sources: Vec<Option<String>>,
    needs_rebuild: bool,
}

impl Draft {
    fn new(schema: TableSchema) -> Self {
        let sources = schema.columns.iter().map(|c| Some(c.name.clone())).collect();
        Draft {
            previous_name: schema.name.clone(),
            schema,
            sources,
            needs_rebuild: false,
        }
    }

    fn ensure_column_unused(&self, name: &str) -> Result<()> {
        if self.schema.column(name).is_some() {
            return Err(DriverError::DuplicateColumn(name.to_string()));
        }
        Ok(())
    }

    /// Columns named by a check constraint cannot be dropped or renamed.
    fn ensure_not_checked(&self, column: &str) -> Result<()> {
        let folded = ident::fold(column);
        for check in &self.schema.checks {
            if super::ddl::referenced_identifiers(&check.clause).contains(&folded) {
                return Err(DriverError::value(
                    3959,
                    format!(
                        "Check constraint '{}' uses column '{column}', hence column cannot be dropped or renamed.",
                        check.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn add_column(&mut self, spec: &ColumnSpec, position: Position, source: Option<String>) -> Result<()> {
        self.ensure_column_unused(&spec.column.name)?;
        let column = column_from_spec(spec, &self.schema.collation)?;
        let idx = match position {
            Position::Last => self.schema.columns.len(),
            Position::First => 0,
            Position::After(after) => match self.schema.column_position(&after) {
                Some(i) => i + 1,
                None => return Err(DriverError::UnknownColumn(after, self.schema.name.clone())),
            },
        };
        self.schema.columns.insert(idx, column);
        self.sources.insert(idx, source);
        Ok(())
    }

    fn remove_column_at(&mut self, idx: usize) -> Option<String> {
        self.schema.columns.remove(idx);
        self.sources.remove(idx)
    }

    fn rename_column_references(&mut self, old: &str, new: &str) {
        for index in &mut self.schema.indexes {
            for part in &mut index.parts {
                if part.column.as_deref().is_some_and(|c| ident::eq(c, old)) {
                    part.column = Some(new.to_string());
                }
            }
        }
        for fk in &mut self.schema.foreign_keys {
            for column in &mut fk.columns {
                if ident::eq(column, old) {
                    *column = new.to_string();
                }
            }
            if ident::eq(&fk.referenced_table, &self.schema.name) {
                for column in &mut fk.referenced_columns {
                    if ident::eq(column, old) {
                        *column = new.to_string();
                    }
                }
            }
        }
    }

    fn drop_column(&mut self, name: &str) -> Result<()> {
        let Some(idx) = self.schema.column_position(name) else {
            return Err(DriverError::CantDrop(name.to_string()));
        };
        if self.schema.columns.len() == 1 {
            return Err(DriverError::value(
                1090,
                "You can't delete all columns with ALTER TABLE; use DROP TABLE instead",
            ));
        }
        self.ensure_not_checked(name)?;
        if let Some(fk) = self
            .schema
            .foreign_keys
            .iter()
            .find(|fk| fk.columns.iter().any(|c| ident::eq(c, name)))
        {
            return Err(DriverError::value(
                1828,
                format!("Cannot drop column '{name}': needed in a foreign key constraint '{}'", fk.name),
            ));
        }
        self.remove_column_at(idx);
        for index in &mut self.schema.indexes {
            index
                .parts
                .retain(|p| !p.column.as_deref().is_some_and(|c| ident::eq(c, name)));
        }
        self.schema.indexes.retain(|i| !i.parts.is_empty());
        Ok(())
    }

    fn drop_primary_key(&mut self) -> Result<()> {
        let Some(pos) = self.schema.indexes.iter().position(|i| i.is_primary()) else {
            return Err(DriverError::CantDrop("PRIMARY".into()));
        };
        self.schema.indexes.remove(pos);
        Ok(())
    }

    fn drop_index(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.schema.indexes.iter().position(|i| ident::eq(&i.name, name)) else {
            return Err(DriverError::CantDrop(name.to_string()));
        };
        let removed = self.schema.indexes.remove(pos);
        let removed_cols = removed.column_names();
        for fk in &self.schema.foreign_keys {
            let supported_by = |cols: &[&str]| {
                cols.len() >= fk.columns.len() && fk.columns.iter().zip(cols).all(|(a, b)| ident::eq(a, b))
            };
            if supported_by(&removed_cols)
                && !self.schema.indexes.iter().any(|i| supported_by(&i.column_names()))
            {
                return Err(DriverError::value(
                    1553,
                    format!("Cannot drop index '{name}': needed in a foreign key constraint"),
                ));
            }
        }
        Ok(())
    }

    fn check_key_parts(&self, parts: &[KeyPart], kind: IndexKind) -> Result<()> {
        for part in parts {
            let Some(name) = &part.column else { continue };
            let Some(column) = self.schema.column(name) else {
                return Err(DriverError::KeyColumnNotFound(name.clone()));
            };
            if kind == IndexKind::Btree && part.sub_part.is_none() && column.ty.is_blob_or_text() {
                return Err(DriverError::value(
                    1170,
                    format!("BLOB/TEXT column '{name}' used in key specification without a key length"),
                ));
            }
        }
        Ok(())
    }

    fn add_index(
        &mut self,
        name: Option<&str>,
        unique: bool,
        kind: IndexKind,
        parts: &[KeyPart],
        comment: &str,
        visible: bool,
    ) -> Result<()> {
        self.check_key_parts(parts, kind)?;
        let name = match name {
            Some(n) => {
                if n.eq_ignore_ascii_case("PRIMARY") {
                    return Err(DriverError::WrongIndexName(n.to_string()));
                }
                ident::validate(n)?;
                if self.schema.index(n).is_some() {
                    return Err(DriverError::DuplicateKeyName(n.to_string()));
                }
                n.to_string()
            }
            None => {
                let base = parts
                    .first()
                    .and_then(|p| p.column.clone())
                    .unwrap_or_else(|| "functional_index".to_string());
                let mut candidate = base.clone();
                let mut n = 2;
                while self.schema.index(&candidate).is_some() || candidate.eq_ignore_ascii_case("PRIMARY") {
                    candidate = format!("{base}_{n}");
                    n += 1;
                }
                candidate
            }
        };
        self.schema.indexes.push(IndexInfo {
            name,
            unique,
            kind,
            parts: parts.to_vec(),
            comment: comment.to_string(),
            visible,
        });
        Ok(())
    }
}

/// Table-level validation shared by every entry point.
fn finish(mut draft: Draft) -> Result<AlterOutcome> {
    let schema = &mut draft.schema;
    if schema.columns.is_empty() {
        return Err(DriverError::value(1113, "A table must have at least 1 column"));
    }
    let autos: Vec<&ColumnInfo> = schema.columns.iter().filter(|c| c.auto_increment).collect();
    let bad_auto = || {
        DriverError::value(
            1075,
            "Incorrect table definition; there can be only one auto column and it must be defined as a key",
        )
    };
    if autos.len() > 1 {
        return Err(bad_auto());
    }
    if let Some(auto) = autos.first() {
        let keyed = schema.indexes.iter().any(|i| {
            i.parts
                .first()
                .and_then(|p| p.column.as_deref())
                .is_some_and(|c| ident::eq(c, &auto.name))
        });
        if !keyed {
            return Err(bad_auto());
        }
    }
    // PRIMARY stays first.
    if let Some(pos) = schema.indexes.iter().position(|i| i.is_primary()) {
        let pk = schema.indexes.remove(pos);
        schema.indexes.insert(0, pk);
    }
    schema.sync_derived();
    Ok(AlterOutcome {
        schema: draft.schema,
        previous_name: draft.previous_name,
        sources: draft.sources,
        needs_rebuild: draft.needs_rebuild,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ddl::{parse_alter_table, parse_create_table, TableBody};
    use crate::engine::Engine;

    fn engine() -> Engine {
        let engine = Engine::open_in_memory().unwrap();
        let store = CatalogStore::new(&engine);
        store.ensure_tables().unwrap();
        store.ensure_temporary_tables().unwrap();
        engine
    }

    fn create(m: &Mutator, sql: &str) -> Result<TableSchema> {
        let ct = parse_create_table(sql)?;
        match ct.body {
            TableBody::Definition {
                columns,
                constraints,
                options,
            } => m.record_create_table(&ct.name, ct.temporary, &columns, &constraints, &options),
            TableBody::Like { .. } => unreachable!(),
        }
    }

    fn alter(m: &Mutator, sql: &str) -> Result<AlterOutcome> {
        let at = parse_alter_table(sql)?;
        let current = m.store().load(&at.name, false)?.unwrap();
        m.record_alter_table(&current, &at.actions)
    }

    #[test]
    fn create_table_records_columns_keys_and_names() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE p (id INT PRIMARY KEY)").unwrap();
        let t = create(
            &m,
            "CREATE TABLE c (
               id INT AUTO_INCREMENT, pid INT, code VARCHAR(10) UNIQUE, n INT CHECK (n > 0),
               PRIMARY KEY (id), KEY (code), FOREIGN KEY (pid) REFERENCES p (id), CHECK (n < 100))",
        )
        .unwrap();
        let names: Vec<&str> = t.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["PRIMARY", "code", "code_2", "pid"]);
        assert_eq!(t.foreign_keys[0].name, "c_ibfk_1");
        let checks: Vec<&str> = t.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(checks, vec!["c_chk_1", "c_chk_2"]);
        let keys: Vec<&str> = t.columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["PRI", "MUL", "UNI", ""]);

        let stored = m.store().load("c", false).unwrap().unwrap();
        assert_eq!(stored.indexes.len(), 4);
        assert_eq!(stored.foreign_keys.len(), 1);
    }

    #[test]
    fn schema_conflicts_are_typed() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE t (a INT, b INT)").unwrap();
        assert_eq!(create(&m, "CREATE TABLE T (x INT)").unwrap_err().code(), 1050);
        assert_eq!(create(&m, "CREATE TABLE u (a INT, A INT)").unwrap_err().code(), 1060);
        assert_eq!(create(&m, "CREATE TABLE u (a INT, KEY (zz))").unwrap_err().code(), 1072);
        assert_eq!(
            create(&m, "CREATE TABLE u (a INT PRIMARY KEY, b INT, PRIMARY KEY (b))")
                .unwrap_err()
                .code(),
            1068
        );
        assert_eq!(create(&m, "CREATE TABLE u (a INT, KEY `PRIMARY` (a))").unwrap_err().code(), 1280);
        assert_eq!(create(&m, "CREATE TABLE u (a INT AUTO_INCREMENT)").unwrap_err().code(), 1075);
        assert_eq!(create(&m, "CREATE TABLE u (a INT NOT NULL DEFAULT NULL)").unwrap_err().code(), 1067);
        assert_eq!(alter(&m, "ALTER TABLE t ADD INDEX ix (a), ADD INDEX ix (b)").unwrap_err().code(), 1061);
        assert_eq!(alter(&m, "ALTER TABLE t DROP COLUMN zz").unwrap_err().code(), 1091);
        assert_eq!(alter(&m, "ALTER TABLE t DROP CHECK nope").unwrap_err().code(), 3940);
    }

    #[test]
    fn drop_column_resequences_and_drops_empty_indexes() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(
            &m,
            "CREATE TABLE t (a INT, b INT, c INT, PRIMARY KEY (a, b), UNIQUE KEY ub (b), KEY abc (a, b, c))",
        )
        .unwrap();
        let out = alter(&m, "ALTER TABLE t DROP COLUMN b").unwrap();
        let t = m.store().load("t", false).unwrap().unwrap();
        assert_eq!(t.columns, out.schema.columns);
        assert_eq!(t.indexes, out.schema.indexes);
        assert_eq!(t.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(t.primary_key().unwrap().column_names(), vec!["a"]);
        assert!(t.index("ub").is_none());
        assert_eq!(t.index("abc").unwrap().column_names(), vec!["a", "c"]);
        assert_eq!(out.sources, vec![Some("a".to_string()), Some("c".to_string())]);
        assert!(out.needs_rebuild);
    }

    #[test]
    fn change_and_add_column_track_sources_and_positions() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE t (a INT, b INT, KEY kb (b))").unwrap();
        let out = alter(
            &m,
            "ALTER TABLE t CHANGE b bee BIGINT NOT NULL, ADD COLUMN z INT FIRST, ADD y INT AFTER a",
        )
        .unwrap();
        let names: Vec<&str> = out.schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "y", "bee"]);
        assert_eq!(
            out.sources,
            vec![None, Some("a".into()), None, Some("b".into())]
        );
        assert_eq!(out.schema.index("kb").unwrap().column_names(), vec!["bee"]);
        assert!(!out.schema.column("bee").unwrap().nullable);
    }

    #[test]
    fn drop_constraint_resolves_kind_or_reports_ambiguity() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE t (a INT, CONSTRAINT dup UNIQUE (a), CONSTRAINT dup CHECK (a > 0))").unwrap();
        assert_eq!(alter(&m, "ALTER TABLE t DROP CONSTRAINT dup").unwrap_err().code(), 3939);
        alter(&m, "ALTER TABLE t DROP CHECK dup").unwrap();
        alter(&m, "ALTER TABLE t DROP CONSTRAINT dup").unwrap();
        let t = m.store().load("t", false).unwrap().unwrap();
        assert!(t.indexes.is_empty() && t.checks.is_empty());
    }

    #[test]
    fn generated_names_continue_after_highest_suffix() {
        let taken = vec!["t_chk_1".to_string(), "T_CHK_7".to_string(), "other_chk_9".to_string()];
        assert_eq!(next_generated_name("t", "chk", &taken), "t_chk_8");
        assert_eq!(next_generated_name("t", "ibfk", &[]), "t_ibfk_1");
    }

    #[test]
    fn check_names_are_unique_across_the_schema() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE a (x INT, CONSTRAINT positive CHECK (x > 0))").unwrap();
        assert_eq!(
            create(&m, "CREATE TABLE b (y INT, CONSTRAINT positive CHECK (y > 0))")
                .unwrap_err()
                .code(),
            3822
        );
    }

    #[test]
    fn rename_table_moves_rows() {
        let engine = engine();
        let m = Mutator::new(CatalogStore::new(&engine), true);
        create(&m, "CREATE TABLE t (a INT PRIMARY KEY)").unwrap();
        let out = alter(&m, "ALTER TABLE t RENAME TO t2, COMMENT = 'moved'").unwrap();
        assert_eq!(out.previous_name, "t");
        assert!(m.store().load("t", false).unwrap().is_none());
        let t2 = m.store().load("t2", false).unwrap().unwrap();
        assert_eq!(t2.comment, "moved");
        assert_eq!(t2.primary_key().unwrap().column_names(), vec!["a"]);
    }
}
