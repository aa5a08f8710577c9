use super::configuration::PostgresConfiguration;
use super::sql;
use super::value::is_supported;
use crate::config::PostgresSettings;
use crate::domain::model::{DType, QueryResult, Table, Value};
use crate::domain::ports::SecretsResolver;
use crate::utils::error::{ConnectorError, Result};
use deadpool_postgres::{Object, Pool};
use futures_util::stream::{self, BoxStream};
use futures_util::{pin_mut, StreamExt, TryStreamExt};
use std::collections::HashMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Column, GenericClient, Row, SimpleQueryMessage};

/// Lazily fetched result chunks. Each call to `read_table` opens its own
/// server-side cursor, so every sequence starts from the first row.
pub type TableChunks = BoxStream<'static, Result<Table>>;

pub enum TableRead {
    Full(Table),
    Chunked(TableChunks),
}

impl TableRead {
    /// Collects chunked results into a single table.
    pub async fn into_table(self) -> Result<Table> {
        match self {
            TableRead::Full(table) => Ok(table),
            TableRead::Chunked(mut chunks) => {
                let mut merged: Option<Table> = None;
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    match merged.as_mut() {
                        None => merged = Some(chunk),
                        Some(table) => {
                            table.rows.extend(chunk.rows);
                            if let (Some(index), Some(extra)) = (table.index.as_mut(), chunk.index) {
                                index.values.extend(extra.values);
                            }
                        }
                    }
                }
                Ok(merged.unwrap_or_default())
            }
        }
    }
}

pub struct ReadOptions<'a> {
    pub index_col: Option<String>,
    /// Turn NUMERIC values into floats.
    pub coerce_float: bool,
    pub params: Vec<&'a (dyn ToSql + Sync)>,
    pub parse_dates: Vec<String>,
    /// Projection applied when reading a whole table by name.
    pub columns: Option<Vec<String>>,
    pub chunksize: Option<usize>,
    pub dtype: HashMap<String, DType>,
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        Self {
            index_col: None,
            coerce_float: true,
            params: Vec::new(),
            parse_dates: Vec::new(),
            columns: None,
            chunksize: None,
            dtype: HashMap::new(),
        }
    }
}

impl<'a> ReadOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_col(mut self, column: impl Into<String>) -> Self {
        self.index_col = Some(column.into());
        self
    }

    pub fn coerce_float(mut self, coerce: bool) -> Self {
        self.coerce_float = coerce;
        self
    }

    pub fn params(mut self, params: &[&'a (dyn ToSql + Sync)]) -> Self {
        self.params = params.to_vec();
        self
    }

    pub fn parse_dates(mut self, columns: &[&str]) -> Self {
        self.parse_dates = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn chunksize(mut self, rows: usize) -> Self {
        self.chunksize = Some(rows);
        self
    }

    pub fn dtype(mut self, column: impl Into<String>, dtype: DType) -> Self {
        self.dtype.insert(column.into(), dtype);
        self
    }

    fn shaping(&self) -> Shaping {
        Shaping {
            index_col: self.index_col.clone(),
            coerce_float: self.coerce_float,
            parse_dates: self.parse_dates.clone(),
            dtype: self.dtype.clone(),
        }
    }
}

/// Post-processing applied to every fetched table or chunk.
#[derive(Debug, Clone)]
struct Shaping {
    index_col: Option<String>,
    coerce_float: bool,
    parse_dates: Vec<String>,
    dtype: HashMap<String, DType>,
}

impl Shaping {
    fn apply(&self, mut table: Table) -> Result<Table> {
        if self.coerce_float {
            for row in &mut table.rows {
                for cell in row.iter_mut() {
                    if let Value::Numeric(_) = cell {
                        *cell = cell.cast(DType::Float)?;
                    }
                }
            }
        }
        table.parse_dates(&self.parse_dates)?;
        table.apply_dtypes(&self.dtype)?;
        if let Some(index_col) = &self.index_col {
            table.set_index(index_col)?;
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IfExists {
    #[default]
    Fail,
    Replace,
    Append,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMethod {
    /// One INSERT statement per row.
    #[default]
    Single,
    /// Multi-row VALUES lists, one statement per chunk.
    Multi,
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub if_exists: IfExists,
    pub index: bool,
    pub index_label: Option<String>,
    pub chunksize: Option<usize>,
    /// Column name to SQL type, overriding inference.
    pub dtype: HashMap<String, String>,
    pub method: InsertMethod,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            if_exists: IfExists::Fail,
            index: true,
            index_label: None,
            chunksize: None,
            dtype: HashMap::new(),
            method: InsertMethod::Single,
        }
    }
}

fn check_columns(columns: &[Column]) -> Result<()> {
    for column in columns {
        if !is_supported(column.type_()) {
            return Err(ConnectorError::UnsupportedColumnType {
                column: column.name().to_string(),
                type_name: column.type_().name().to_string(),
            });
        }
    }
    Ok(())
}

fn rows_to_table(columns: &[Column], rows: &[Row]) -> Result<Table> {
    check_columns(columns)?;
    let mut table = Table::new(columns.iter().map(|c| c.name().to_string()).collect());
    for row in rows {
        let values = (0..columns.len())
            .map(|i| row.try_get::<_, Value>(i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        table.push_row(values)?;
    }
    Ok(table)
}

pub(crate) fn sort_table_names(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

/// Connector over a pooled PostgreSQL database, scoped to one schema.
pub struct PostgresConnector {
    pool: Pool,
    db_host: String,
    db_port: u16,
    database: String,
    schema: String,
    echo: bool,
}

impl std::fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

impl PostgresConnector {
    pub async fn setup(
        resolver: &dyn SecretsResolver,
        vault_config: &str,
        database: &str,
        schema: &str,
        settings: &PostgresSettings,
    ) -> Result<Self> {
        let configuration =
            PostgresConfiguration::load(resolver, vault_config, database, schema, settings).await?;
        Self::from_configuration(&configuration)
    }

    pub fn from_configuration(configuration: &PostgresConfiguration) -> Result<Self> {
        Ok(Self {
            pool: configuration.get_connection_handle()?,
            db_host: configuration.db_host().to_string(),
            db_port: configuration.db_port(),
            database: configuration.database().to_string(),
            schema: configuration.schema().to_string(),
            echo: configuration.echo(),
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn db_host(&self) -> &str {
        &self.db_host
    }

    pub fn db_port(&self) -> u16 {
        self.db_port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn echo(&self, statement: &str) {
        if self.echo {
            tracing::info!(target: "platform_connector::sql", "{}", statement);
        }
    }

    async fn connection(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    /// Reads a table by name or the result of a SQL statement.
    ///
    /// With `chunksize` set the rows are pulled lazily through a server-side
    /// cursor, `chunksize` rows at a time.
    pub async fn read_table(&self, source: &str, options: &ReadOptions<'_>) -> Result<TableRead> {
        let statement = if sql::is_table_reference(source) {
            sql::select_table_sql(&self.schema, source.trim(), options.columns.as_deref())
        } else {
            source.to_string()
        };
        let shaping = options.shaping();

        match options.chunksize {
            Some(chunksize) => {
                let chunks = self
                    .open_chunks(&statement, &options.params, chunksize.max(1), shaping)
                    .await?;
                Ok(TableRead::Chunked(chunks))
            }
            None => {
                let client = self.connection().await?;
                self.echo(&statement);
                let prepared = client.prepare(&statement).await?;
                let rows = client.query(&prepared, &options.params).await?;
                let table = rows_to_table(prepared.columns(), &rows)?;
                Ok(TableRead::Full(shaping.apply(table)?))
            }
        }
    }

    async fn open_chunks(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        chunksize: usize,
        shaping: Shaping,
    ) -> Result<TableChunks> {
        let client = self.connection().await?;
        let cursor = format!("platform_connector_{}", uuid::Uuid::new_v4().simple());
        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", cursor, statement);

        let prepared = client.prepare(statement).await?;
        check_columns(prepared.columns())?;
        let columns = prepared.columns().iter().map(|c| c.name().to_string()).collect();

        self.echo(&declare);
        client.batch_execute("BEGIN").await?;
        client.execute(declare.as_str(), params).await?;

        let state = CursorState {
            client,
            fetch: format!("FETCH FORWARD {} FROM {}", chunksize, cursor),
            close: format!("CLOSE {}; COMMIT", cursor),
            chunksize,
            shaping,
            columns,
            yielded: false,
            done: false,
        };

        let chunks = stream::try_unfold(state, |mut state| async move {
            if state.done {
                return Ok::<_, ConnectorError>(None);
            }
            let rows = state.client.query(state.fetch.as_str(), &[]).await?;
            if rows.len() < state.chunksize {
                state.client.batch_execute(&state.close).await?;
                state.done = true;
            }
            let table = if rows.is_empty() {
                // 空結果仍回傳一個保留欄位名稱的區塊
                if state.yielded {
                    return Ok(None);
                }
                Table::new(state.columns.clone())
            } else {
                rows_to_table(rows[0].columns(), &rows)?
            };
            let table = state.shaping.apply(table)?;
            state.yielded = true;
            Ok(Some((table, state)))
        });
        Ok(chunks.boxed())
    }

    /// Writes `table` to `name` in the connector's schema, in a transaction
    /// on a pooled connection. Returns the number of rows inserted.
    pub async fn write_table(&self, table: &Table, name: &str, options: &WriteOptions) -> Result<u64> {
        let mut client = self.connection().await?;
        let transaction = client.transaction().await?;
        let written = self.write_table_on(&*transaction, table, name, options).await?;
        transaction.commit().await?;
        Ok(written)
    }

    /// Same as [`write_table`](Self::write_table) but on a caller-managed
    /// client or transaction. Nothing is committed here.
    pub async fn write_table_on<C>(
        &self,
        client: &C,
        table: &Table,
        name: &str,
        options: &WriteOptions,
    ) -> Result<u64>
    where
        C: GenericClient + Sync,
    {
        let qualified = sql::qualified_name(&self.schema, name);
        let (columns, rows) = frame_for_write(table, options);

        let exists = client
            .query_one(sql::TABLE_EXISTS_SQL, &[&self.schema, &name])
            .await?
            .get::<_, bool>(0);

        let create = match (exists, options.if_exists) {
            (true, IfExists::Fail) => {
                return Err(ConnectorError::TableExists { name: qualified });
            }
            (true, IfExists::Replace) => {
                let drop = sql::drop_table_sql(&qualified);
                self.echo(&drop);
                client.batch_execute(&drop).await?;
                true
            }
            (true, IfExists::Append) => false,
            (false, _) => true,
        };

        if create {
            let definitions: Vec<(String, String)> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let sql_type = options.dtype.get(column).cloned().unwrap_or_else(|| {
                        sql::infer_sql_type(rows.iter().map(|row| &row[i])).to_string()
                    });
                    (column.clone(), sql_type)
                })
                .collect();
            let create_sql = sql::create_table_sql(&qualified, &definitions);
            self.echo(&create_sql);
            client.batch_execute(&create_sql).await?;
        }

        let limit = sql::max_rows_per_statement(columns.len());
        let chunksize = options.chunksize.unwrap_or(rows.len()).clamp(1, limit);
        let mut written = 0;

        match options.method {
            InsertMethod::Single => {
                let insert = sql::insert_sql(&qualified, &columns, 1);
                self.echo(&insert);
                let prepared = client.prepare(&insert).await?;
                for chunk in rows.chunks(chunksize) {
                    for row in chunk {
                        let params: Vec<&(dyn ToSql + Sync)> =
                            row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
                        written += client.execute(&prepared, &params).await?;
                    }
                }
            }
            InsertMethod::Multi => {
                for chunk in rows.chunks(chunksize) {
                    let insert = sql::insert_sql(&qualified, &columns, chunk.len());
                    self.echo(&insert);
                    let params: Vec<&(dyn ToSql + Sync)> = chunk
                        .iter()
                        .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                        .collect();
                    written += client.execute(insert.as_str(), &params).await?;
                }
            }
        }

        tracing::debug!("Wrote {} rows to {}", written, qualified);
        Ok(written)
    }

    /// Table names in the connector's schema, sorted.
    pub async fn list_table_names(&self) -> Result<Vec<String>> {
        let client = self.connection().await?;
        let rows = client.query(sql::LIST_TABLES_SQL, &[&self.schema]).await?;
        let names = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sort_table_names(names))
    }

    /// Runs a statement in its own transaction and commits it. Scripts with
    /// several `;`-separated commands go through the simple query protocol
    /// in the same transaction. The result is decoded before the commit, so
    /// a statement whose output cannot be decoded is rolled back. The pooled
    /// connection goes back to the pool on every exit path.
    pub async fn execute_query(&self, statement: &str) -> Result<QueryResult> {
        let mut client = self.connection().await?;
        self.echo(statement);

        let prepared = match client.prepare(statement).await {
            Ok(prepared) => {
                check_columns(prepared.columns())?;
                Some(prepared)
            }
            Err(e) if is_multi_command(&e) => None,
            Err(e) => return Err(e.into()),
        };

        let transaction = client.transaction().await?;
        let result = match &prepared {
            Some(prepared) => {
                let stream = transaction
                    .query_raw(prepared, std::iter::empty::<&str>())
                    .await?;
                pin_mut!(stream);
                let mut rows = Vec::new();
                while let Some(row) = stream.try_next().await? {
                    rows.push(row);
                }
                QueryResult {
                    table: rows_to_table(prepared.columns(), &rows)?,
                    rows_affected: stream.rows_affected().unwrap_or(0),
                }
            }
            None => script_result(transaction.simple_query(statement).await?)?,
        };
        transaction.commit().await?;

        tracing::info!("Query executed");
        Ok(result)
    }
}

/// Postgres refuses to prepare text holding more than one command.
fn is_multi_command(error: &tokio_postgres::Error) -> bool {
    error.code() == Some(&SqlState::SYNTAX_ERROR)
        && error
            .as_db_error()
            .is_some_and(|db| db.message().contains("multiple commands"))
}

/// Result of the last command of a script. Cells arrive as text.
fn script_result(messages: Vec<SimpleQueryMessage>) -> Result<QueryResult> {
    let mut table = Table::default();
    let mut rows_affected = 0;
    let mut finished = true;

    for message in messages {
        if finished {
            table = Table::default();
            finished = false;
        }
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                table = Table::new(columns.iter().map(|c| c.name().to_string()).collect());
            }
            SimpleQueryMessage::Row(row) => {
                if table.columns.is_empty() {
                    table.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let values = (0..row.len())
                    .map(|i| row.get(i).map_or(Value::Null, |v| Value::Text(v.to_string())))
                    .collect();
                table.push_row(values)?;
            }
            SimpleQueryMessage::CommandComplete(count) => {
                rows_affected = count;
                finished = true;
            }
            _ => {}
        }
    }

    Ok(QueryResult {
        table,
        rows_affected,
    })
}

struct CursorState {
    client: Object,
    fetch: String,
    close: String,
    chunksize: usize,
    shaping: Shaping,
    columns: Vec<String>,
    yielded: bool,
    done: bool,
}

/// Columns and rows as written, with the index prepended when requested.
fn frame_for_write(table: &Table, options: &WriteOptions) -> (Vec<String>, Vec<Vec<Value>>) {
    if !options.index {
        return (table.columns.clone(), table.rows.clone());
    }

    let label = options
        .index_label
        .clone()
        .or_else(|| table.index.as_ref().map(|i| i.name.clone()))
        .unwrap_or_else(|| "index".to_string());

    let mut columns = Vec::with_capacity(table.columns.len() + 1);
    columns.push(label);
    columns.extend(table.columns.iter().cloned());

    let rows = table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let index_value = match &table.index {
                Some(index) => index.values.get(i).cloned().unwrap_or(Value::Null),
                None => Value::Int(i as i64),
            };
            let mut full = Vec::with_capacity(row.len() + 1);
            full.push(index_value);
            full.extend(row.iter().cloned());
            full
        })
        .collect();

    (columns, rows)
}
