//! MySQL DDL: CREATE TABLE, ALTER TABLE, CREATE/DROP INDEX and RENAME
//! TABLE statements, mapped from the parsed AST into definitions the
//! catalog mutator applies.
//!
//! ALTER TABLE clauses and index kinds the parser has no grammar for
//! (`RENAME INDEX`, `DROP CHECK`, `ALTER INDEX .. INVISIBLE`, table options,
//! `CREATE FULLTEXT INDEX` and a few more) are read with the parser's own
//! token primitives, one clause at a time.

use sqlparser::ast::{
    self, AlterColumnOperation, AlterTableOperation, ColumnDef, ColumnOption, CommentDef,
    CreateTableLikeKind, CreateTableOptions, DataType, Expr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GeneratedExpressionMode, Ident, IndexColumn, IndexOption,
    MySQLColumnPosition, ObjectName, ObjectNamePart, RenameTableNameKind, SqlOption, Statement,
    TableConstraint, UnaryOperator, Value,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;

use super::types::MysqlType;
use super::{ColumnInfo, Generated, IndexKind, KeyPart};
use crate::error::{DriverError, Result};
use crate::lexer;
use crate::translator::names;
use crate::translator::parse_error;

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultSpec {
    Null,
    Literal(String),
    /// `CURRENT_TIMESTAMP[(n)]` or a parenthesized expression, without the
    /// outer parentheses.
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckSpec {
    pub name: Option<String>,
    pub clause: String,
    pub enforced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub column: ColumnInfo,
    pub default: Option<DefaultSpec>,
    pub primary_key: bool,
    pub unique: bool,
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintSpec {
    PrimaryKey {
        parts: Vec<KeyPart>,
        comment: String,
    },
    Unique {
        name: Option<String>,
        parts: Vec<KeyPart>,
        comment: String,
        visible: bool,
    },
    Index {
        name: Option<String>,
        kind: IndexKind,
        parts: Vec<KeyPart>,
        comment: String,
        visible: bool,
    },
    ForeignKey {
        name: Option<String>,
        index_name: Option<String>,
        columns: Vec<String>,
        referenced_table: String,
        referenced_columns: Vec<String>,
        on_delete: String,
        on_update: String,
    },
    Check(CheckSpec),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOptions {
    pub engine: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub auto_increment: Option<i64>,
    pub comment: Option<String>,
    pub row_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableBody {
    Definition {
        columns: Vec<ColumnSpec>,
        constraints: Vec<ConstraintSpec>,
        options: TableOptions,
    },
    Like {
        schema: Option<String>,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub schema: Option<String>,
    pub name: String,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub body: TableBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    Last,
    First,
    After(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn { column: ColumnSpec, position: Position },
    /// CHANGE and MODIFY. For MODIFY, `old` is the column's own name.
    ChangeColumn { old: String, column: ColumnSpec, position: Position },
    DropColumn(String),
    RenameColumn { old: String, new: String },
    SetDefault { column: String, default: DefaultSpec },
    DropDefault(String),
    AddConstraint(ConstraintSpec),
    DropPrimaryKey,
    DropIndex(String),
    DropForeignKey(String),
    DropCheck(String),
    DropConstraint(String),
    SetEnforced { name: String, enforced: bool },
    SetIndexVisible { name: String, visible: bool },
    RenameIndex { old: String, new: String },
    RenameTable { schema: Option<String>, name: String },
    Options(TableOptions),
    /// ALGORITHM, LOCK, FORCE, ORDER BY and similar clauses with no
    /// catalog effect.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub schema: Option<String>,
    pub name: String,
    pub actions: Vec<AlterAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub schema: Option<String>,
    pub table: String,
    pub if_not_exists: bool,
    pub index: ConstraintSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropIndex {
    pub name: String,
    pub schema: Option<String>,
    pub table: String,
}

pub type QualifiedName = (Option<String>, String);

pub fn parse_create_table(sql: &str) -> Result<CreateTable> {
    match statement(sql)? {
        Statement::CreateTable(ct) => create_table(&ct),
        other => Err(DriverError::Parse(format!("expected CREATE TABLE, found '{other}'"))),
    }
}

/// Parses ALTER TABLE. Statements outside the parser's grammar are read
/// clause by clause.
pub fn parse_alter_table(sql: &str) -> Result<AlterTable> {
    if let Ok(Statement::AlterTable(at)) = statement(sql) {
        return alter_table(&at);
    }
    let dialect = MySqlDialect {};
    let mut p = Parser::new(&dialect).try_with_sql(sql).map_err(parse_error)?;
    p.expect_keyword_is(Keyword::ALTER).map_err(parse_error)?;
    p.parse_keyword(Keyword::IGNORE);
    p.expect_keyword_is(Keyword::TABLE).map_err(parse_error)?;
    let (schema, name) = qualified(&p.parse_object_name(false).map_err(parse_error)?)?;
    let mut actions = Vec::new();
    loop {
        // Table options swallow the comma that follows them.
        let separated = match mysql_clause(&mut p)? {
            Some(clause) => {
                actions.extend(clause);
                p.get_current_token().token == Token::Comma
            }
            None => {
                let op = p.parse_alter_table_operation().map_err(parse_error)?;
                actions.extend(alter_operation(&op)?);
                false
            }
        };
        if !separated && !p.consume_token(&Token::Comma) {
            break;
        }
    }
    expect_end(&mut p)?;
    Ok(AlterTable {
        schema,
        name,
        actions,
    })
}

/// Parses CREATE [UNIQUE | FULLTEXT | SPATIAL] INDEX.
pub fn parse_create_index(sql: &str) -> Result<CreateIndex> {
    let err = match statement(sql) {
        Ok(Statement::CreateIndex(ci)) => return create_index(&ci),
        Ok(other) => return Err(DriverError::Parse(format!("expected CREATE INDEX, found '{other}'"))),
        Err(err) => err,
    };
    let dialect = MySqlDialect {};
    let mut p = Parser::new(&dialect).try_with_sql(sql).map_err(parse_error)?;
    p.expect_keyword_is(Keyword::CREATE).map_err(parse_error)?;
    let kind = match p.parse_one_of_keywords(&[Keyword::FULLTEXT, Keyword::SPATIAL]) {
        Some(Keyword::FULLTEXT) => IndexKind::Fulltext,
        Some(_) => IndexKind::Spatial,
        None => return Err(err),
    };
    p.expect_keyword_is(Keyword::INDEX).map_err(parse_error)?;
    let Statement::CreateIndex(ci) = p.parse_create_index(false).map_err(parse_error)? else {
        return Err(err);
    };
    expect_end(&mut p)?;
    let mut out = create_index(&ci)?;
    if let ConstraintSpec::Index { kind: k, .. } = &mut out.index {
        *k = kind;
    }
    Ok(out)
}

fn statement(sql: &str) -> Result<Statement> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql).map_err(parse_error)?;
    if statements.len() != 1 {
        return Err(DriverError::Parse(format!("expected one statement in '{sql}'")));
    }
    Ok(statements.remove(0))
}

fn expect_end(p: &mut Parser) -> Result<()> {
    p.consume_token(&Token::SemiColon);
    p.expect_token(&Token::EOF).map_err(parse_error)?;
    Ok(())
}

pub fn create_table(ct: &ast::CreateTable) -> Result<CreateTable> {
    let (schema, name) = qualified(&ct.name)?;
    if ct.query.is_some() {
        return Err(DriverError::not_supported("CREATE TABLE ... SELECT"));
    }
    if ct.partition_by.is_some() {
        return Err(DriverError::not_supported("PARTITION BY"));
    }
    let body = match &ct.like {
        Some(CreateTableLikeKind::Plain(like) | CreateTableLikeKind::Parenthesized(like)) => {
            let (schema, name) = qualified(&like.name)?;
            TableBody::Like { schema, name }
        }
        None if ct.columns.is_empty() => {
            return Err(DriverError::value(1113, "A table must have at least 1 column"));
        }
        None => {
            let mut options = table_options(&ct.table_options)?;
            if let Some(CommentDef::WithEq(c) | CommentDef::WithoutEq(c)) = &ct.comment {
                options.comment = Some(c.clone());
            }
            TableBody::Definition {
                columns: ct.columns.iter().map(column_spec).collect::<Result<_>>()?,
                constraints: ct.constraints.iter().map(constraint).collect::<Result<_>>()?,
                options,
            }
        }
    };
    Ok(CreateTable {
        schema,
        name,
        temporary: ct.temporary,
        if_not_exists: ct.if_not_exists,
        body,
    })
}

pub fn alter_table(at: &ast::AlterTable) -> Result<AlterTable> {
    let (schema, name) = qualified(&at.name)?;
    let mut actions = Vec::new();
    for op in &at.operations {
        actions.extend(alter_operation(op)?);
    }
    Ok(AlterTable {
        schema,
        name,
        actions,
    })
}

pub fn create_index(ci: &ast::CreateIndex) -> Result<CreateIndex> {
    let name = match &ci.name {
        Some(name) => last_name(name)?,
        None => return Err(DriverError::Parse("CREATE INDEX requires an index name".into())),
    };
    let (schema, table) = qualified(&ci.table_name)?;
    let parts = key_parts(&ci.columns)?;
    let comment = index_comment(&ci.index_options);
    let index = if ci.unique {
        ConstraintSpec::Unique {
            name: Some(name),
            parts,
            comment,
            visible: true,
        }
    } else {
        ConstraintSpec::Index {
            name: Some(name),
            kind: IndexKind::Btree,
            parts,
            comment,
            visible: true,
        }
    };
    Ok(CreateIndex {
        schema,
        table,
        if_not_exists: ci.if_not_exists,
        index,
    })
}

/// `DROP INDEX name ON table`.
pub fn drop_index(names: &[ObjectName], table: Option<&ObjectName>) -> Result<DropIndex> {
    let ([name], Some(table)) = (names, table) else {
        return Err(DriverError::Parse("DROP INDEX expects one index and an ON clause".into()));
    };
    let (schema, table) = qualified(table)?;
    Ok(DropIndex {
        name: last_name(name)?,
        schema,
        table,
    })
}

/// `RENAME TABLE a TO b [, c TO d]...`
pub fn rename_pairs(renames: &[ast::RenameTable]) -> Result<Vec<(QualifiedName, QualifiedName)>> {
    renames
        .iter()
        .map(|r| Ok((qualified(&r.old_name)?, qualified(&r.new_name)?)))
        .collect()
}

/// Splits `[schema.]name`.
pub fn qualified(name: &ObjectName) -> Result<QualifiedName> {
    let mut parts = names::object_parts(name)?;
    let table = parts.pop();
    let schema = parts.pop();
    match table {
        Some(table) if parts.is_empty() => Ok((schema, table)),
        _ => Err(DriverError::Parse(format!("invalid table name '{name}'"))),
    }
}

fn last_name(name: &ObjectName) -> Result<String> {
    names::object_parts(name)?
        .pop()
        .ok_or_else(|| DriverError::Parse(format!("invalid name '{name}'")))
}

/// Identifiers (bare or quoted) appearing in an expression, folded.
pub fn referenced_identifiers(expr: &str) -> Vec<String> {
    lexer::tokenize(expr, true)
        .map(|toks| {
            toks.iter()
                .filter_map(|t| t.ident().map(crate::ident::fold))
                .collect()
        })
        .unwrap_or_default()
}

fn table_options(options: &CreateTableOptions) -> Result<TableOptions> {
    let mut out = TableOptions::default();
    match options {
        CreateTableOptions::None => {}
        CreateTableOptions::Plain(list) => {
            for option in list {
                table_option(option, &mut out)?;
            }
        }
        other => return Err(DriverError::not_supported(format!("table options > {other}"))),
    }
    Ok(out)
}

fn table_option(option: &SqlOption, out: &mut TableOptions) -> Result<()> {
    match option {
        SqlOption::Comment(CommentDef::WithEq(c) | CommentDef::WithoutEq(c)) => {
            out.comment = Some(c.clone());
        }
        SqlOption::NamedParenthesizedList(list) if list.key.value.eq_ignore_ascii_case("ENGINE") => {
            out.engine = list.name.as_ref().map(|n| n.value.clone());
        }
        SqlOption::KeyValue { key, value } => {
            let text = option_text(value);
            match key.value.to_ascii_uppercase().as_str() {
                "CHARSET" | "DEFAULT CHARSET" | "CHARACTER SET" | "DEFAULT CHARACTER SET" => {
                    out.charset = Some(text.to_ascii_lowercase());
                }
                "COLLATE" | "DEFAULT COLLATE" => out.collation = Some(text.to_ascii_lowercase()),
                "AUTO_INCREMENT" => {
                    let next = text
                        .parse()
                        .map_err(|_| DriverError::Parse(format!("invalid AUTO_INCREMENT value '{text}'")))?;
                    out.auto_increment = Some(next);
                }
                "ROW_FORMAT" => out.row_format = Some(text),
                _ => {}
            }
        }
        // TABLESPACE, UNION and the remaining storage options have no
        // catalog effect.
        _ => {}
    }
    Ok(())
}

fn option_text(value: &Expr) -> String {
    match value {
        Expr::Value(v) => match &v.value {
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => s.clone(),
            Value::Number(n, _) => n.to_string(),
            other => other.to_string(),
        },
        Expr::Identifier(i) => i.value.clone(),
        other => other.to_string(),
    }
}

pub fn column_spec(def: &ColumnDef) -> Result<ColumnSpec> {
    column_from(
        &def.name,
        &def.data_type,
        def.options.iter().map(|o| (o.name.as_ref(), &o.option)),
    )
}

/// Builds a column from its type and options. Each option carries the
/// `CONSTRAINT` symbol written before it, if any.
fn column_from<'a>(
    name: &Ident,
    data_type: &DataType,
    options: impl Iterator<Item = (Option<&'a Ident>, &'a ColumnOption)>,
) -> Result<ColumnSpec> {
    let type_text = data_type.to_string();
    let mut spec = ColumnSpec {
        column: ColumnInfo::new(&name.value, MysqlType::parse(&type_text)?),
        default: None,
        primary_key: false,
        unique: false,
        checks: Vec::new(),
    };
    if type_text.eq_ignore_ascii_case("serial") {
        spec.column.nullable = false;
        spec.column.auto_increment = true;
        spec.unique = true;
    }
    for (symbol, option) in options {
        match option {
            ColumnOption::Null => spec.column.nullable = true,
            ColumnOption::NotNull => spec.column.nullable = false,
            ColumnOption::Default(expr) => spec.default = Some(default_spec(expr)?),
            ColumnOption::DialectSpecific(tokens) if is_auto_increment(tokens) => {
                spec.column.auto_increment = true;
            }
            ColumnOption::PrimaryKey(_) => spec.primary_key = true,
            ColumnOption::Unique(_) => spec.unique = true,
            ColumnOption::Comment(c) => spec.column.comment = c.clone(),
            ColumnOption::Collation(c) => {
                spec.column.ty.collation = Some(last_name(c)?.to_ascii_lowercase());
            }
            ColumnOption::CharacterSet(c) => {
                spec.column.ty.charset = Some(last_name(c)?.to_ascii_lowercase());
            }
            // Column-level REFERENCES is parsed and ignored, as MySQL does.
            ColumnOption::ForeignKey(_) => {}
            ColumnOption::Check(check) => spec.checks.push(CheckSpec {
                name: symbol.or(check.name.as_ref()).map(|n| n.value.clone()),
                clause: check.expr.to_string(),
                enforced: check.enforced.unwrap_or(true),
            }),
            ColumnOption::OnUpdate(expr) => {
                if current_timestamp(expr).is_none() {
                    return Err(DriverError::value(
                        1294,
                        format!("Invalid ON UPDATE clause for '{}' column", name.value),
                    ));
                }
                spec.column.on_update_current_timestamp = true;
            }
            ColumnOption::Generated {
                generation_expr: Some(expr),
                generation_expr_mode,
                ..
            } => {
                spec.column.generated = Some(Generated {
                    expression: expr.to_string(),
                    stored: matches!(generation_expr_mode, Some(GeneratedExpressionMode::Stored)),
                });
            }
            ColumnOption::Invisible | ColumnOption::Srid(_) => {}
            other => return Err(DriverError::not_supported(format!("column option > {other}"))),
        }
    }
    Ok(spec)
}

fn is_auto_increment(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t, Token::Word(w) if w.value.eq_ignore_ascii_case("AUTO_INCREMENT")))
}

fn default_spec(expr: &Expr) -> Result<DefaultSpec> {
    if let Some(ts) = current_timestamp(expr) {
        return Ok(DefaultSpec::Expression(ts));
    }
    match expr {
        Expr::Value(v) => literal_default(&v.value),
        Expr::UnaryOp { op, expr: operand } => match (op, operand.as_ref()) {
            (UnaryOperator::Minus, Expr::Value(v)) if matches!(v.value, Value::Number(..)) => {
                Ok(DefaultSpec::Literal(format!("-{}", v.value)))
            }
            (UnaryOperator::Plus, Expr::Value(v)) if matches!(v.value, Value::Number(..)) => {
                Ok(DefaultSpec::Literal(v.value.to_string()))
            }
            _ => Err(invalid_default(expr)),
        },
        Expr::Nested(inner) => Ok(DefaultSpec::Expression(inner.to_string())),
        Expr::Prefixed { value, .. } => default_spec(value),
        _ => Err(invalid_default(expr)),
    }
}

fn literal_default(value: &Value) -> Result<DefaultSpec> {
    let text = match value {
        Value::Null => return Ok(DefaultSpec::Null),
        Value::Boolean(b) => u8::from(*b).to_string(),
        Value::Number(n, _) => n.to_string(),
        Value::SingleQuotedString(s)
        | Value::DoubleQuotedString(s)
        | Value::NationalStringLiteral(s)
        | Value::EscapedStringLiteral(s) => s.clone(),
        Value::HexStringLiteral(h) => {
            let bytes = lexer::hex_bytes(h)
                .ok_or_else(|| DriverError::Parse(format!("invalid hex literal X'{h}'")))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Value::SingleQuotedByteStringLiteral(bits) if bits.is_empty() => "0".to_string(),
        Value::SingleQuotedByteStringLiteral(bits) => u64::from_str_radix(bits, 2)
            .map_err(|_| DriverError::Parse(format!("invalid bit literal b'{bits}'")))?
            .to_string(),
        other => return Err(DriverError::Parse(format!("invalid default value {other}"))),
    };
    Ok(DefaultSpec::Literal(text))
}

fn invalid_default(expr: &Expr) -> DriverError {
    DriverError::Parse(format!("invalid default value {expr}; expressions need parentheses"))
}

/// `CURRENT_TIMESTAMP[(n)]` and its synonyms, normalized.
fn current_timestamp(expr: &Expr) -> Option<String> {
    let Expr::Function(f) = expr else {
        return None;
    };
    let name = f.name.to_string().to_ascii_uppercase();
    if !matches!(name.as_str(), "CURRENT_TIMESTAMP" | "NOW" | "LOCALTIME" | "LOCALTIMESTAMP") {
        return None;
    }
    let fsp: u32 = match &f.args {
        FunctionArguments::None => 0,
        FunctionArguments::List(list) => match list.args.as_slice() {
            [] => 0,
            [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(v)))] => match &v.value {
                Value::Number(n, _) => n.to_string().parse().ok()?,
                _ => return None,
            },
            _ => return None,
        },
        _ => return None,
    };
    Some(if fsp > 0 {
        format!("CURRENT_TIMESTAMP({fsp})")
    } else {
        "CURRENT_TIMESTAMP".to_string()
    })
}

fn key_parts(columns: &[IndexColumn]) -> Result<Vec<KeyPart>> {
    columns
        .iter()
        .map(|c| {
            let expr = &c.column.expr;
            let mut part = match expr {
                Expr::Identifier(i) => KeyPart::column(&i.value),
                Expr::Function(f) => prefix_part(f).ok_or_else(|| bare_expression(expr))?,
                Expr::Nested(inner) => KeyPart {
                    column: None,
                    expression: Some(inner.to_string()),
                    sub_part: None,
                    descending: false,
                },
                _ => return Err(bare_expression(expr)),
            };
            part.descending = c.column.options.asc == Some(false);
            Ok(part)
        })
        .collect()
}

fn bare_expression(expr: &Expr) -> DriverError {
    DriverError::Parse(format!("functional key part '{expr}' must be enclosed in parentheses"))
}

/// A column prefix such as `name(10)`, which parses as a call.
fn prefix_part(f: &ast::Function) -> Option<KeyPart> {
    let [ObjectNamePart::Identifier(column)] = f.name.0.as_slice() else {
        return None;
    };
    let FunctionArguments::List(list) = &f.args else {
        return None;
    };
    let [FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Value(v)))] = list.args.as_slice() else {
        return None;
    };
    let Value::Number(n, _) = &v.value else {
        return None;
    };
    Some(KeyPart {
        sub_part: Some(n.to_string().parse().ok()?),
        ..KeyPart::column(&column.value)
    })
}

fn index_comment(options: &[IndexOption]) -> String {
    options
        .iter()
        .find_map(|o| match o {
            IndexOption::Comment(c) => Some(c.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn ident_name(i: &Option<Ident>) -> Option<String> {
    i.as_ref().map(|i| i.value.clone())
}

fn constraint(c: &TableConstraint) -> Result<ConstraintSpec> {
    let spec = match c {
        TableConstraint::PrimaryKey(pk) => ConstraintSpec::PrimaryKey {
            parts: key_parts(&pk.columns)?,
            comment: index_comment(&pk.index_options),
        },
        TableConstraint::Unique(u) => ConstraintSpec::Unique {
            name: ident_name(&u.index_name).or_else(|| ident_name(&u.name)),
            parts: key_parts(&u.columns)?,
            comment: index_comment(&u.index_options),
            visible: true,
        },
        TableConstraint::Index(i) => ConstraintSpec::Index {
            name: ident_name(&i.name),
            kind: IndexKind::Btree,
            parts: key_parts(&i.columns)?,
            comment: index_comment(&i.index_options),
            visible: true,
        },
        TableConstraint::FulltextOrSpatial(f) => ConstraintSpec::Index {
            name: ident_name(&f.opt_index_name),
            kind: if f.fulltext {
                IndexKind::Fulltext
            } else {
                IndexKind::Spatial
            },
            parts: key_parts(&f.columns)?,
            comment: String::new(),
            visible: true,
        },
        TableConstraint::ForeignKey(fk) => {
            let action = |a: &Option<ast::ReferentialAction>| {
                a.as_ref().map_or_else(|| "NO ACTION".to_string(), |a| a.to_string())
            };
            ConstraintSpec::ForeignKey {
                name: ident_name(&fk.name),
                index_name: ident_name(&fk.index_name),
                columns: fk.columns.iter().map(|c| c.value.clone()).collect(),
                referenced_table: last_name(&fk.foreign_table)?,
                referenced_columns: fk.referred_columns.iter().map(|c| c.value.clone()).collect(),
                on_delete: action(&fk.on_delete),
                on_update: action(&fk.on_update),
            }
        }
        TableConstraint::Check(check) => ConstraintSpec::Check(CheckSpec {
            name: ident_name(&check.name),
            clause: check.expr.to_string(),
            enforced: check.enforced.unwrap_or(true),
        }),
        #[allow(unreachable_patterns)]
        other => return Err(DriverError::not_supported(format!("constraint > {other}"))),
    };
    Ok(spec)
}

fn position(p: Option<&MySQLColumnPosition>) -> Position {
    match p {
        None => Position::Last,
        Some(MySQLColumnPosition::First) => Position::First,
        Some(MySQLColumnPosition::After(column)) => Position::After(column.value.clone()),
    }
}

fn alter_operation(op: &AlterTableOperation) -> Result<Vec<AlterAction>> {
    let action = match op {
        AlterTableOperation::AddConstraint { constraint: c, .. } => {
            AlterAction::AddConstraint(constraint(c)?)
        }
        AlterTableOperation::AddColumn {
            column_def,
            column_position,
            ..
        } => AlterAction::AddColumn {
            column: column_spec(column_def)?,
            position: position(column_position.as_ref()),
        },
        AlterTableOperation::DropColumn { column_names, .. } => {
            return Ok(column_names
                .iter()
                .map(|c| AlterAction::DropColumn(c.value.clone()))
                .collect());
        }
        AlterTableOperation::DropPrimaryKey { .. } => AlterAction::DropPrimaryKey,
        AlterTableOperation::DropIndex { name } => AlterAction::DropIndex(name.value.clone()),
        AlterTableOperation::DropForeignKey { name, .. } => {
            AlterAction::DropForeignKey(name.value.clone())
        }
        AlterTableOperation::DropConstraint { name, .. } => {
            AlterAction::DropConstraint(name.value.clone())
        }
        AlterTableOperation::RenameColumn {
            old_column_name,
            new_column_name,
        } => AlterAction::RenameColumn {
            old: old_column_name.value.clone(),
            new: new_column_name.value.clone(),
        },
        AlterTableOperation::RenameTable { table_name } => {
            let target = match table_name {
                RenameTableNameKind::To(n) | RenameTableNameKind::As(n) => n,
            };
            let (schema, name) = qualified(target)?;
            AlterAction::RenameTable { schema, name }
        }
        AlterTableOperation::ChangeColumn {
            old_name,
            new_name,
            data_type,
            options,
            column_position,
        } => AlterAction::ChangeColumn {
            old: old_name.value.clone(),
            column: column_from(new_name, data_type, options.iter().map(|o| (None, o)))?,
            position: position(column_position.as_ref()),
        },
        AlterTableOperation::ModifyColumn {
            col_name,
            data_type,
            options,
            column_position,
        } => AlterAction::ChangeColumn {
            old: col_name.value.clone(),
            column: column_from(col_name, data_type, options.iter().map(|o| (None, o)))?,
            position: position(column_position.as_ref()),
        },
        AlterTableOperation::AlterColumn { column_name, op } => match op {
            AlterColumnOperation::SetDefault { value } => AlterAction::SetDefault {
                column: column_name.value.clone(),
                default: default_spec(value)?,
            },
            AlterColumnOperation::DropDefault => {
                AlterAction::DropDefault(column_name.value.clone())
            }
            other => return Err(DriverError::not_supported(format!("ALTER COLUMN > {other}"))),
        },
        AlterTableOperation::AutoIncrement { value, .. } => {
            let text = value.value.to_string();
            let next = text
                .parse()
                .map_err(|_| DriverError::Parse(format!("invalid AUTO_INCREMENT value '{text}'")))?;
            AlterAction::Options(TableOptions {
                auto_increment: Some(next),
                ..TableOptions::default()
            })
        }
        AlterTableOperation::Algorithm { .. } | AlterTableOperation::Lock { .. } => {
            AlterAction::Ignored
        }
        other => return Err(DriverError::not_supported(format!("ALTER TABLE > {other}"))),
    };
    Ok(vec![action])
}

/// Consumes a non-keyword word sequence such as `WITH VALIDATION`, or
/// nothing.
fn eat_words(p: &mut Parser, words: &[&str]) -> bool {
    let matched = words.iter().enumerate().all(|(i, word)| {
        matches!(p.peek_nth_token(i).token, Token::Word(w) if w.value.eq_ignore_ascii_case(word))
    });
    if matched {
        for _ in words {
            p.next_token();
        }
    }
    matched
}

fn visibility(p: &mut Parser) -> Option<bool> {
    if eat_words(p, &["VISIBLE"]) {
        Some(true)
    } else if p.parse_keyword(Keyword::INVISIBLE) {
        Some(false)
    } else {
        None
    }
}

fn ident(p: &mut Parser) -> Result<String> {
    Ok(p.parse_identifier().map_err(parse_error)?.value)
}

/// `ALTER [COLUMN] c SET {VISIBLE | INVISIBLE}`.
fn column_visibility(p: &mut Parser) -> std::result::Result<(), ParserError> {
    p.expect_keyword_is(Keyword::ALTER)?;
    p.parse_keyword(Keyword::COLUMN);
    p.parse_identifier()?;
    p.expect_keyword_is(Keyword::SET)?;
    match visibility(p) {
        Some(_) => Ok(()),
        None => p.expected("VISIBLE or INVISIBLE", p.peek_token()),
    }
}

/// `ADD [COLUMN] (definition, ...)`.
fn column_list(p: &mut Parser) -> std::result::Result<Vec<ColumnDef>, ParserError> {
    p.expect_keyword_is(Keyword::ADD)?;
    p.parse_keyword(Keyword::COLUMN);
    p.expect_token(&Token::LParen)?;
    let defs = p.parse_comma_separated(|p| p.parse_column_def())?;
    p.expect_token(&Token::RParen)?;
    Ok(defs)
}

/// One ALTER TABLE clause the parser has no grammar for. `None` leaves
/// the clause to the parser.
fn mysql_clause(p: &mut Parser) -> Result<Option<Vec<AlterAction>>> {
    let action = if p.parse_keyword(Keyword::RENAME) {
        if p.parse_one_of_keywords(&[Keyword::INDEX, Keyword::KEY]).is_none() {
            p.prev_token();
            return Ok(None);
        }
        let old = ident(p)?;
        p.expect_keyword_is(Keyword::TO).map_err(parse_error)?;
        AlterAction::RenameIndex {
            old,
            new: ident(p)?,
        }
    } else if p.parse_keywords(&[Keyword::DROP, Keyword::KEY]) {
        AlterAction::DropIndex(ident(p)?)
    } else if p.parse_keywords(&[Keyword::DROP, Keyword::CHECK]) {
        AlterAction::DropCheck(ident(p)?)
    } else if p.parse_keywords(&[Keyword::ALTER, Keyword::INDEX]) {
        let name = ident(p)?;
        let Some(visible) = visibility(p) else {
            return p.expected("VISIBLE or INVISIBLE", p.peek_token()).map_err(parse_error);
        };
        AlterAction::SetIndexVisible { name, visible }
    } else if p.parse_keywords(&[Keyword::ALTER, Keyword::CHECK])
        || p.parse_keywords(&[Keyword::ALTER, Keyword::CONSTRAINT])
    {
        let name = ident(p)?;
        let enforced = !p.parse_keyword(Keyword::NOT);
        p.expect_keyword_is(Keyword::ENFORCED).map_err(parse_error)?;
        AlterAction::SetEnforced { name, enforced }
    } else if p.maybe_parse(column_visibility).map_err(parse_error)?.is_some() {
        AlterAction::Ignored
    } else if p.parse_keywords(&[Keyword::CONVERT, Keyword::TO]) {
        if !p.parse_keywords(&[Keyword::CHARACTER, Keyword::SET]) {
            p.expect_keyword_is(Keyword::CHARSET).map_err(parse_error)?;
        }
        let mut options = TableOptions {
            charset: Some(ident(p)?.to_ascii_lowercase()),
            ..TableOptions::default()
        };
        if p.parse_keyword(Keyword::COLLATE) {
            options.collation = Some(ident(p)?.to_ascii_lowercase());
        }
        AlterAction::Options(options)
    } else if p.parse_keyword(Keyword::FORCE) {
        AlterAction::Ignored
    } else if p.parse_keywords(&[Keyword::ORDER, Keyword::BY]) {
        p.parse_comma_separated(|p| p.parse_order_by_expr())
            .map_err(parse_error)?;
        AlterAction::Ignored
    } else if p.parse_keywords(&[Keyword::ENABLE, Keyword::KEYS])
        || p.parse_keywords(&[Keyword::DISABLE, Keyword::KEYS])
        || eat_words(p, &["WITH", "VALIDATION"])
        || eat_words(p, &["WITHOUT", "VALIDATION"])
    {
        AlterAction::Ignored
    } else if let Some(defs) = p.maybe_parse(column_list).map_err(parse_error)? {
        let added = defs
            .iter()
            .map(|def| {
                Ok(AlterAction::AddColumn {
                    column: column_spec(def)?,
                    position: Position::Last,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(added));
    } else if p.peek_keyword(Keyword::PARTITION) {
        return Err(DriverError::not_supported("ALTER TABLE ... PARTITION"));
    } else {
        let list = p.parse_plain_options().map_err(parse_error)?;
        if list.is_empty() {
            return Ok(None);
        }
        let mut options = TableOptions::default();
        for option in &list {
            table_option(option, &mut options)?;
        }
        AlterAction::Options(options)
    };
    Ok(Some(vec![action]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(sql: &str) -> (Vec<ColumnSpec>, Vec<ConstraintSpec>, TableOptions) {
        match parse_create_table(sql).unwrap().body {
            TableBody::Definition {
                columns,
                constraints,
                options,
            } => (columns, constraints, options),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn parses_columns_with_options() {
        let (cols, _, options) = definition(
            "CREATE TABLE IF NOT EXISTS `shop`.`items` (
               id INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
               name VARCHAR(50) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL DEFAULT 'x' COMMENT 'label',
               price DECIMAL(10,2) DEFAULT -1.5,
               flag BOOL DEFAULT TRUE,
               kind ENUM('a','b') NULL,
               updated TIMESTAMP(3) NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3),
               total INT AS (id * 2) STORED,
               qty INT CHECK (qty >= 0)
             ) ENGINE=InnoDB AUTO_INCREMENT=10 DEFAULT CHARSET=latin1 COMMENT='inventory'",
        );
        assert_eq!(cols.len(), 8);
        let id = &cols[0];
        assert!(id.primary_key && id.column.auto_increment && !id.column.nullable);
        assert!(id.column.ty.unsigned);

        let name = &cols[1];
        assert_eq!(name.column.ty.data_type, "varchar");
        assert_eq!(name.column.ty.collation.as_deref(), Some("utf8mb4_bin"));
        assert_eq!(name.default, Some(DefaultSpec::Literal("x".into())));
        assert_eq!(name.column.comment, "label");

        assert_eq!(cols[2].default, Some(DefaultSpec::Literal("-1.5".into())));
        assert_eq!(cols[3].default, Some(DefaultSpec::Literal("1".into())));
        assert_eq!(cols[4].column.ty.members, vec!["a", "b"]);
        assert_eq!(
            cols[5].default,
            Some(DefaultSpec::Expression("CURRENT_TIMESTAMP(3)".into()))
        );
        assert!(cols[5].column.on_update_current_timestamp);
        assert_eq!(
            cols[6].column.generated,
            Some(Generated {
                expression: "id * 2".into(),
                stored: true
            })
        );
        assert_eq!(cols[7].checks[0].clause, "qty >= 0");

        assert_eq!(options.engine.as_deref(), Some("InnoDB"));
        assert_eq!(options.auto_increment, Some(10));
        assert_eq!(options.charset.as_deref(), Some("latin1"));
        assert_eq!(options.comment.as_deref(), Some("inventory"));
    }

    #[test]
    fn parses_table_constraints() {
        let (_, cons, _) = definition(
            "CREATE TABLE t (a INT, b INT, c TEXT,
               PRIMARY KEY (a),
               UNIQUE KEY uk (b DESC),
               KEY (c(10)),
               FULLTEXT ft (c),
               CONSTRAINT fk FOREIGN KEY (b) REFERENCES p (id) ON DELETE CASCADE ON UPDATE SET NULL,
               CONSTRAINT positive CHECK (a > 0) NOT ENFORCED,
               INDEX ((a + b)))",
        );
        assert_eq!(cons.len(), 7);
        assert!(matches!(&cons[0], ConstraintSpec::PrimaryKey { parts, .. } if parts[0].column.as_deref() == Some("a")));
        assert!(matches!(&cons[1], ConstraintSpec::Unique { name: Some(n), parts, .. } if n == "uk" && parts[0].descending));
        assert!(matches!(&cons[2], ConstraintSpec::Index { name: None, parts, .. } if parts[0].sub_part == Some(10)));
        assert!(matches!(&cons[3], ConstraintSpec::Index { kind: IndexKind::Fulltext, .. }));
        match &cons[4] {
            ConstraintSpec::ForeignKey {
                name,
                referenced_table,
                on_delete,
                on_update,
                ..
            } => {
                assert_eq!(name.as_deref(), Some("fk"));
                assert_eq!(referenced_table, "p");
                assert_eq!(on_delete, "CASCADE");
                assert_eq!(on_update, "SET NULL");
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(
            cons[5],
            ConstraintSpec::Check(CheckSpec {
                name: Some("positive".into()),
                clause: "a > 0".into(),
                enforced: false
            })
        );
        assert!(matches!(&cons[6], ConstraintSpec::Index { parts, .. } if parts[0].expression.as_deref() == Some("a + b")));
    }

    #[test]
    fn parses_like_and_rejects_select() {
        let t = parse_create_table("CREATE TEMPORARY TABLE t2 LIKE t1").unwrap();
        assert!(t.temporary);
        assert_eq!(
            t.body,
            TableBody::Like {
                schema: None,
                name: "t1".into()
            }
        );
        let err = parse_create_table("CREATE TABLE t2 AS SELECT 1").unwrap_err();
        assert_eq!(err.code(), 1235);
        let err = parse_create_table("CREATE TABLE t2 (a INT").unwrap_err();
        assert_eq!(err.code(), 1064);
    }

    #[test]
    fn parses_alter_specs() {
        let alter = parse_alter_table(
            "ALTER TABLE t ADD COLUMN x INT NOT NULL AFTER a, DROP COLUMN y,
             CHANGE b bb VARCHAR(10) FIRST, MODIFY c BIGINT,
             ADD INDEX ix (x), DROP INDEX old, DROP PRIMARY KEY,
             ALTER COLUMN d SET DEFAULT 5, ALTER e DROP DEFAULT,
             RENAME COLUMN f TO g, RENAME INDEX i1 TO i2, DROP FOREIGN KEY fk1,
             ALGORITHM=INPLACE, AUTO_INCREMENT = 100, RENAME TO t2",
        )
        .unwrap();
        assert_eq!(alter.name, "t");
        let a = &alter.actions;
        assert!(matches!(&a[0], AlterAction::AddColumn { position: Position::After(p), .. } if p == "a"));
        assert_eq!(a[1], AlterAction::DropColumn("y".into()));
        assert!(matches!(&a[2], AlterAction::ChangeColumn { old, column, position: Position::First } if old == "b" && column.column.name == "bb"));
        assert!(matches!(&a[3], AlterAction::ChangeColumn { old, .. } if old == "c"));
        assert!(matches!(&a[4], AlterAction::AddConstraint(ConstraintSpec::Index { .. })));
        assert_eq!(a[5], AlterAction::DropIndex("old".into()));
        assert_eq!(a[6], AlterAction::DropPrimaryKey);
        assert_eq!(
            a[7],
            AlterAction::SetDefault {
                column: "d".into(),
                default: DefaultSpec::Literal("5".into())
            }
        );
        assert_eq!(a[8], AlterAction::DropDefault("e".into()));
        assert_eq!(
            a[9],
            AlterAction::RenameColumn {
                old: "f".into(),
                new: "g".into()
            }
        );
        assert!(matches!(&a[10], AlterAction::RenameIndex { .. }));
        assert_eq!(a[11], AlterAction::DropForeignKey("fk1".into()));
        assert_eq!(a[12], AlterAction::Ignored);
        assert!(matches!(&a[13], AlterAction::Options(o) if o.auto_increment == Some(100)));
        assert!(matches!(&a[14], AlterAction::RenameTable { name, .. } if name == "t2"));
    }


    #[test]
    fn reads_clauses_outside_the_parser_grammar() {
        let alter = parse_alter_table(
            "ALTER TABLE db.t DROP CHECK c1, DROP KEY k1, ALTER INDEX k2 INVISIBLE,
             ALTER CHECK c2 NOT ENFORCED, ENGINE=InnoDB, COMMENT 'x',
             CONVERT TO CHARACTER SET utf8mb4 COLLATE utf8mb4_bin, FORCE,
             ADD (p INT, q INT NOT NULL), ORDER BY a DESC",
        )
        .unwrap();
        assert_eq!(alter.schema.as_deref(), Some("db"));
        let a = &alter.actions;
        assert_eq!(a.len(), 10);
        assert_eq!(a[0], AlterAction::DropCheck("c1".into()));
        assert_eq!(a[1], AlterAction::DropIndex("k1".into()));
        assert_eq!(
            a[2],
            AlterAction::SetIndexVisible {
                name: "k2".into(),
                visible: false
            }
        );
        assert_eq!(
            a[3],
            AlterAction::SetEnforced {
                name: "c2".into(),
                enforced: false
            }
        );
        assert!(matches!(&a[4], AlterAction::Options(o)
            if o.engine.as_deref() == Some("InnoDB") && o.comment.as_deref() == Some("x")));
        assert!(matches!(&a[5], AlterAction::Options(o)
            if o.charset.as_deref() == Some("utf8mb4") && o.collation.as_deref() == Some("utf8mb4_bin")));
        assert_eq!(a[6], AlterAction::Ignored);
        assert!(matches!(&a[7], AlterAction::AddColumn { column, position: Position::Last } if column.column.name == "p"));
        assert!(matches!(&a[8], AlterAction::AddColumn { column, .. } if !column.column.nullable));
        assert_eq!(a[9], AlterAction::Ignored);

        let renamed = parse_alter_table("ALTER TABLE t RENAME KEY a TO b").unwrap();
        assert_eq!(
            renamed.actions,
            vec![AlterAction::RenameIndex {
                old: "a".into(),
                new: "b".into()
            }]
        );
        let err = parse_alter_table("ALTER TABLE t RENAME INDEX a").unwrap_err();
        assert_eq!(err.code(), 1064);
        let err = parse_alter_table("ALTER TABLE t PARTITION BY HASH(a)").unwrap_err();
        assert_eq!(err.code(), 1235);
    }

    #[test]
    fn maps_literal_and_expression_defaults() {
        let (cols, _, _) = definition(
            "CREATE TABLE t (a BIT(4) DEFAULT b'101', b VARBINARY(4) DEFAULT X'4142',
               c INT DEFAULT (a + 1), d DATETIME DEFAULT NOW(), e INT DEFAULT NULL)",
        );
        assert_eq!(cols[0].default, Some(DefaultSpec::Literal("5".into())));
        assert_eq!(cols[1].default, Some(DefaultSpec::Literal("AB".into())));
        assert_eq!(cols[2].default, Some(DefaultSpec::Expression("a + 1".into())));
        assert_eq!(
            cols[3].default,
            Some(DefaultSpec::Expression("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(cols[4].default, Some(DefaultSpec::Null));
        let err = parse_create_table("CREATE TABLE t (a INT DEFAULT 1 + 2)").unwrap_err();
        assert_eq!(err.code(), 1064);
    }

    #[test]
    fn parses_index_statements() {
        let ci = parse_create_index("CREATE UNIQUE INDEX ux ON db.t (a, b(4))").unwrap();
        assert_eq!(ci.schema.as_deref(), Some("db"));
        assert!(matches!(ci.index, ConstraintSpec::Unique { ref name, .. } if name.as_deref() == Some("ux")));

        let Statement::Drop { names, table, .. } = statement("DROP INDEX ux ON t").unwrap() else {
            panic!("expected DROP");
        };
        let di = drop_index(&names, table.as_ref()).unwrap();
        assert_eq!((di.name.as_str(), di.table.as_str()), ("ux", "t"));

        let Statement::RenameTable(renames) = statement("RENAME TABLE a TO b, c TO d").unwrap() else {
            panic!("expected RENAME TABLE");
        };
        let pairs = rename_pairs(&renames).unwrap();
        assert_eq!(pairs[1], ((None, "c".into()), (None, "d".into())));
    }

    #[test]
    fn fulltext_and_spatial_indexes() {
        let ci = parse_create_index("CREATE FULLTEXT INDEX ft ON t (body)").unwrap();
        assert!(matches!(ci.index, ConstraintSpec::Index { kind: IndexKind::Fulltext, ref name, .. }
            if name.as_deref() == Some("ft")));
        let ci = parse_create_index("CREATE SPATIAL INDEX sp ON t (pt);").unwrap();
        assert!(matches!(ci.index, ConstraintSpec::Index { kind: IndexKind::Spatial, .. }));
        let err = parse_create_index("CREATE INDEX ON t (a)").unwrap_err();
        assert_eq!(err.code(), 1064);
    }

    #[test]
    fn serial_implies_unique_auto_increment() {
        let (cols, _, _) = definition("CREATE TABLE t (id SERIAL)");
        let c = &cols[0];
        assert!(c.unique && c.column.auto_increment && !c.column.nullable);
        assert!(c.column.ty.unsigned);
    }
}
