use crate::auth::Credentials;
use crate::driver::Driver;
use crate::error::DriverError;
use crate::lexer::{self, Tok};
use crate::model::{Cell, ExecOutput};
use crate::session::SERVER_VERSION;
use async_trait::async_trait;
use opensrv_mysql::{
    AsyncMysqlShim, Column, ColumnFlags, ColumnType, ErrorKind, InitWriter, OkResponse,
    ParamParser, QueryResultWriter, StatementMetaWriter, StatusFlags, ValueInner,
};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::iter;
use tracing::debug;

pub struct Backend {
    driver: Mutex<Driver>,
    credentials: Credentials,
    salt: [u8; 20],
    conn_id: u32,
    next_stmt_id: u32,
    stmts: HashMap<u32, String>,
}

impl Backend {
    pub fn new(driver: Driver, credentials: Credentials, conn_id: u32) -> Self {
        let mut salt = [0u8; 20];
        OsRng.fill_bytes(&mut salt);
        // The scramble must not contain NUL or '$'.
        for b in salt.iter_mut() {
            *b = (*b % 94) + 33;
            if *b == b'$' {
                *b = b'%';
            }
        }
        Self {
            driver: Mutex::new(driver),
            credentials,
            salt,
            conn_id,
            next_stmt_id: 1,
            stmts: HashMap::new(),
        }
    }

    fn status_flags(autocommit: bool, in_trans: bool) -> StatusFlags {
        let mut flags = StatusFlags::empty();
        if in_trans {
            flags.insert(StatusFlags::SERVER_STATUS_IN_TRANS);
        }
        if autocommit {
            flags.insert(StatusFlags::SERVER_STATUS_AUTOCOMMIT);
        }
        flags
    }

    /// Runs a statement and writes its outcome. Driver errors go to the
    /// client; only write failures end the connection.
    async fn run<'a, W>(&self, query: &str, results: QueryResultWriter<'a, W>) -> Result<(), DriverError>
    where
        W: tokio::io::AsyncWrite + Unpin + Send,
    {
        let (out, autocommit, in_trans) = {
            let mut driver = self.driver.lock();
            let out = driver.query(query);
            (out, driver.autocommit(), driver.in_transaction())
        };

        match out {
            Ok(ExecOutput::Ok {
                affected_rows,
                last_insert_id,
                info,
            }) => {
                let ok = OkResponse {
                    affected_rows,
                    last_insert_id,
                    status_flags: Self::status_flags(autocommit, in_trans),
                    info,
                    ..Default::default()
                };
                results.completed(ok).await?;
            }
            Ok(ExecOutput::ResultSet { columns, rows }) => {
                let types: Vec<ColumnType> = (0..columns.len()).map(|i| column_type(&rows, i)).collect();
                let columns: Vec<Column> = columns
                    .into_iter()
                    .zip(&types)
                    .map(|(name, coltype)| Column {
                        table: String::new(),
                        column: name,
                        coltype: *coltype,
                        colflags: ColumnFlags::empty(),
                    })
                    .collect();
                let mut rw = results.start(&columns).await?;
                for row in rows {
                    for (cell, coltype) in row.into_iter().zip(&types) {
                        match (cell, coltype) {
                            (Cell::Null, _) => rw.write_col(None::<u8>)?,
                            (Cell::Int(n), ColumnType::MYSQL_TYPE_LONGLONG) => rw.write_col(n)?,
                            (Cell::Int(n), ColumnType::MYSQL_TYPE_DOUBLE) => rw.write_col(n as f64)?,
                            (Cell::Float(f), ColumnType::MYSQL_TYPE_DOUBLE) => rw.write_col(f)?,
                            (Cell::Blob(b), _) => rw.write_col(b.as_slice())?,
                            (other, _) => rw.write_col(other.to_text().unwrap_or_default())?,
                        }
                    }
                    rw.end_row().await?;
                }
                rw.finish().await?;
            }
            Err(err) => {
                debug!(conn_id = self.conn_id, code = err.code(), %err, "statement failed");
                results.error(error_kind(&err), err.to_string().as_bytes()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<W> AsyncMysqlShim<W> for Backend
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    type Error = DriverError;

    fn version(&self) -> String {
        SERVER_VERSION.to_string()
    }

    fn connect_id(&self) -> u32 {
        self.conn_id
    }

    fn salt(&self) -> [u8; 20] {
        self.salt
    }

    async fn authenticate(
        &self,
        auth_plugin: &str,
        username: &[u8],
        salt: &[u8],
        auth_data: &[u8],
    ) -> bool {
        if auth_plugin != "mysql_native_password" {
            return false;
        }
        let Ok(username) = std::str::from_utf8(username) else {
            return false;
        };
        let ok = self.credentials.verify(username, salt, auth_data);
        if ok {
            self.driver.lock().set_user(username);
        } else {
            debug!(conn_id = self.conn_id, user = username, "authentication failed");
        }
        ok
    }

    async fn on_prepare<'a>(
        &'a mut self,
        query: &'a str,
        info: StatementMetaWriter<'a, W>,
    ) -> Result<(), DriverError> {
        let backslash_escapes = !self.driver.lock().session().no_backslash_escapes();
        let param_count = match lexer::tokenize(query, backslash_escapes) {
            Ok(tokens) => tokens.iter().filter(|t| t.tok == Tok::Param).count(),
            Err(err) => {
                info.error(error_kind(&err), err.to_string().as_bytes()).await?;
                return Ok(());
            }
        };

        let id = self.next_stmt_id;
        self.next_stmt_id = self.next_stmt_id.wrapping_add(1);
        self.stmts.insert(id, query.to_string());

        let params: Vec<Column> = (0..param_count)
            .map(|_| Column {
                table: String::new(),
                column: String::new(),
                coltype: ColumnType::MYSQL_TYPE_VAR_STRING,
                colflags: ColumnFlags::empty(),
            })
            .collect();

        info.reply(id, params.iter(), iter::empty::<&Column>()).await?;
        Ok(())
    }

    async fn on_execute<'a>(
        &'a mut self,
        id: u32,
        params: ParamParser<'a>,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), DriverError> {
        let Some(template) = self.stmts.get(&id) else {
            results
                .error(ErrorKind::ER_UNKNOWN_STMT_HANDLER, format!("Unknown prepared statement handler ({id}) given to mysqld_stmt_execute").as_bytes())
                .await?;
            return Ok(());
        };
        let backslash_escapes = !self.driver.lock().session().no_backslash_escapes();
        let values = params.into_iter().map(|p| p.value).collect::<Vec<_>>();
        match bind_parameters(template, values, backslash_escapes) {
            Ok(query) => self.run(&query, results).await,
            Err(err) => {
                results.error(error_kind(&err), err.to_string().as_bytes()).await?;
                Ok(())
            }
        }
    }

    async fn on_close<'a>(&'a mut self, stmt: u32)
    where
        W: 'async_trait,
    {
        self.stmts.remove(&stmt);
    }

    async fn on_init<'a>(
        &'a mut self,
        db: &'a str,
        writer: InitWriter<'a, W>,
    ) -> Result<(), DriverError> {
        let used = self.driver.lock().use_database(db);
        match used {
            Ok(()) => writer.ok().await?,
            Err(err) => writer.error(error_kind(&err), err.to_string().as_bytes()).await?,
        }
        Ok(())
    }

    async fn on_query<'a>(
        &'a mut self,
        query: &'a str,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), DriverError> {
        self.run(query, results).await
    }
}

/// Wire type for a result column: integer or double when every value
/// allows it, text otherwise.
fn column_type(rows: &[Vec<Cell>], i: usize) -> ColumnType {
    let mut ty = None;
    for cell in rows.iter().filter_map(|r| r.get(i)) {
        ty = match (cell, ty) {
            (Cell::Null, ty) => ty,
            (Cell::Int(_), None | Some(ColumnType::MYSQL_TYPE_LONGLONG)) => Some(ColumnType::MYSQL_TYPE_LONGLONG),
            (Cell::Int(_) | Cell::Float(_), None | Some(ColumnType::MYSQL_TYPE_LONGLONG | ColumnType::MYSQL_TYPE_DOUBLE)) => {
                Some(ColumnType::MYSQL_TYPE_DOUBLE)
            }
            _ => return ColumnType::MYSQL_TYPE_VAR_STRING,
        };
    }
    ty.unwrap_or(ColumnType::MYSQL_TYPE_VAR_STRING)
}

/// Substitutes parameter values for the `?` markers of a prepared
/// statement, as literals of the text the client would have sent.
fn bind_parameters(
    template: &str,
    values: Vec<opensrv_mysql::Value<'_>>,
    backslash_escapes: bool,
) -> Result<String, DriverError> {
    let markers: Vec<(usize, usize)> = lexer::tokenize(template, backslash_escapes)?
        .into_iter()
        .filter(|t| t.tok == Tok::Param)
        .map(|t| (t.start, t.end))
        .collect();
    if markers.len() != values.len() {
        return Err(DriverError::value(
            1210,
            "Incorrect arguments to mysqld_stmt_execute",
        ));
    }
    let mut out = String::with_capacity(template.len());
    let mut copied = 0;
    for ((start, end), value) in markers.into_iter().zip(values) {
        out.push_str(&template[copied..start]);
        out.push_str(&parameter_literal(value, backslash_escapes)?);
        copied = end;
    }
    out.push_str(&template[copied..]);
    Ok(out)
}

fn parameter_literal(value: opensrv_mysql::Value<'_>, backslash_escapes: bool) -> Result<String, DriverError> {
    match value.into_inner() {
        ValueInner::NULL => Ok("NULL".to_string()),
        ValueInner::Int(n) => Ok(n.to_string()),
        ValueInner::UInt(n) => Ok(n.to_string()),
        ValueInner::Double(f) if f.is_finite() => Ok(format!("{f:?}")),
        ValueInner::Double(_) => Err(DriverError::Invalid("non-finite double parameter".into())),
        ValueInner::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(string_literal(s, backslash_escapes)),
            Err(_) => Ok(crate::ident::blob_literal(bytes)),
        },
        ValueInner::Date(bytes) | ValueInner::Datetime(bytes) => Ok(format!("'{}'", datetime_text(bytes)?)),
        ValueInner::Time(bytes) => Ok(format!("'{}'", time_text(bytes)?)),
    }
}

fn string_literal(s: &str, backslash_escapes: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' if backslash_escapes => out.push_str("\\\\"),
            '\0' if backslash_escapes => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn micros(bytes: Option<&[u8]>) -> u32 {
    match bytes {
        Some([a, b, c, d]) => u32::from_le_bytes([*a, *b, *c, *d]),
        _ => 0,
    }
}

fn fraction(us: u32) -> String {
    if us == 0 {
        String::new()
    } else {
        format!(".{us:06}")
    }
}

/// Binary-protocol DATE/DATETIME: year, month, day, then optional
/// hour, minute, second and microseconds.
fn datetime_text(b: &[u8]) -> Result<String, DriverError> {
    let (year, month, day) = match b {
        [] => (0, 0, 0),
        [y0, y1, m, d, ..] => (u16::from_le_bytes([*y0, *y1]), *m, *d),
        _ => return Err(DriverError::Invalid("malformed date parameter".into())),
    };
    let date = format!("{year:04}-{month:02}-{day:02}");
    if b.len() <= 4 {
        return Ok(date);
    }
    let [h, mi, s] = b.get(4..7).and_then(|t| <[u8; 3]>::try_from(t).ok()).unwrap_or([0; 3]);
    Ok(format!("{date} {h:02}:{mi:02}:{s:02}{}", fraction(micros(b.get(7..11)))))
}

/// Binary-protocol TIME: sign, days, hour, minute, second, then optional
/// microseconds.
fn time_text(b: &[u8]) -> Result<String, DriverError> {
    match b {
        [] => Ok("00:00:00".to_string()),
        [neg, d0, d1, d2, d3, h, mi, s, rest @ ..] => {
            let days = u32::from_le_bytes([*d0, *d1, *d2, *d3]);
            let hours = days * 24 + u32::from(*h);
            let sign = if *neg == 1 { "-" } else { "" };
            Ok(format!(
                "{sign}{hours:02}:{mi:02}:{s:02}{}",
                fraction(micros(rest.get(0..4)))
            ))
        }
        _ => Err(DriverError::Invalid("malformed time parameter".into())),
    }
}

/// Client-visible error number. Codes outside this table are reported as
/// ER_UNKNOWN_ERROR with the MySQL message text.
fn error_kind(err: &DriverError) -> ErrorKind {
    match err.code() {
        1007 => ErrorKind::ER_DB_CREATE_EXISTS,
        1008 => ErrorKind::ER_DB_DROP_EXISTS,
        1044 => ErrorKind::ER_DBACCESS_DENIED_ERROR,
        1046 => ErrorKind::ER_NO_DB_ERROR,
        1048 => ErrorKind::ER_BAD_NULL_ERROR,
        1049 => ErrorKind::ER_BAD_DB_ERROR,
        1050 => ErrorKind::ER_TABLE_EXISTS_ERROR,
        1051 => ErrorKind::ER_BAD_TABLE_ERROR,
        1052 => ErrorKind::ER_NON_UNIQ_ERROR,
        1054 => ErrorKind::ER_BAD_FIELD_ERROR,
        1060 => ErrorKind::ER_DUP_FIELDNAME,
        1061 => ErrorKind::ER_DUP_KEYNAME,
        1062 => ErrorKind::ER_DUP_ENTRY,
        1064 => ErrorKind::ER_PARSE_ERROR,
        1068 => ErrorKind::ER_MULTIPLE_PRI_KEY,
        1072 => ErrorKind::ER_KEY_COLUMN_DOES_NOT_EXITS,
        1091 => ErrorKind::ER_CANT_DROP_FIELD_OR_KEY,
        1109 => ErrorKind::ER_UNKNOWN_TABLE,
        1136 => ErrorKind::ER_WRONG_VALUE_COUNT_ON_ROW,
        1146 => ErrorKind::ER_NO_SUCH_TABLE,
        1193 => ErrorKind::ER_UNKNOWN_SYSTEM_VARIABLE,
        1205 => ErrorKind::ER_LOCK_WAIT_TIMEOUT,
        1210 => ErrorKind::ER_WRONG_ARGUMENTS,
        1231 => ErrorKind::ER_WRONG_VALUE_FOR_VAR,
        1235 => ErrorKind::ER_NOT_SUPPORTED_YET,
        1264 => ErrorKind::ER_WARN_DATA_OUT_OF_RANGE,
        1265 => ErrorKind::WARN_DATA_TRUNCATED,
        1280 => ErrorKind::ER_WRONG_NAME_FOR_INDEX,
        1292 => ErrorKind::ER_TRUNCATED_WRONG_VALUE,
        1305 => ErrorKind::ER_SP_DOES_NOT_EXIST,
        1364 => ErrorKind::ER_NO_DEFAULT_FOR_FIELD,
        1366 => ErrorKind::ER_TRUNCATED_WRONG_VALUE_FOR_FIELD,
        1406 => ErrorKind::ER_DATA_TOO_LONG,
        1451 => ErrorKind::ER_ROW_IS_REFERENCED_2,
        1452 => ErrorKind::ER_NO_REFERENCED_ROW_2,
        _ => ErrorKind::ER_UNKNOWN_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_dates_and_times_render_as_mysql_text() {
        assert_eq!(datetime_text(&[0xE8, 0x07, 3, 9]).unwrap(), "2024-03-09");
        assert_eq!(
            datetime_text(&[0xE8, 0x07, 3, 9, 13, 5, 59]).unwrap(),
            "2024-03-09 13:05:59"
        );
        assert_eq!(
            datetime_text(&[0xE8, 0x07, 3, 9, 13, 5, 59, 0x40, 0xE2, 0x01, 0x00]).unwrap(),
            "2024-03-09 13:05:59.123456"
        );
        assert_eq!(datetime_text(&[]).unwrap(), "0000-00-00");
        assert_eq!(time_text(&[1, 1, 0, 0, 0, 2, 3, 4]).unwrap(), "-26:03:04");
        assert!(time_text(&[0, 1]).is_err());
    }

    #[test]
    fn string_parameters_escape_for_the_session() {
        assert_eq!(string_literal("it's", true), "'it''s'");
        assert_eq!(string_literal("a\\b", true), "'a\\\\b'");
        assert_eq!(string_literal("a\\b", false), "'a\\b'");
    }

    #[test]
    fn result_column_types_follow_values() {
        let rows = vec![vec![Cell::Int(1), Cell::Int(1), Cell::Text("a".into())], vec![
            Cell::Null,
            Cell::Float(1.5),
            Cell::Int(2),
        ]];
        assert_eq!(column_type(&rows, 0), ColumnType::MYSQL_TYPE_LONGLONG);
        assert_eq!(column_type(&rows, 1), ColumnType::MYSQL_TYPE_DOUBLE);
        assert_eq!(column_type(&rows, 2), ColumnType::MYSQL_TYPE_VAR_STRING);
        assert_eq!(column_type(&[], 0), ColumnType::MYSQL_TYPE_VAR_STRING);
    }

    #[test]
    fn error_numbers_reach_the_client() {
        assert_eq!(error_kind(&DriverError::NoSuchTable("app.t".into())) as u16, 1146);
        assert_eq!(error_kind(&DriverError::value(1264, "Out of range")) as u16, 1264);
        assert_eq!(error_kind(&DriverError::CheckViolated("c".into())) as u16, 1105);
    }
}
