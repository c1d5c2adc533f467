use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridsweep::dataset::{ColumnMeta, DatasetMeta};
use gridsweep::engine::{ActionDefinition, Engine};
use gridsweep::envelope::ActionMessages;
use gridsweep::error::{Result, SweepError};
use gridsweep::process::{MutationScope, RowCells};
use gridsweep::server;
use gridsweep::settings::Settings;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    if let Err(e) = run().await {
        eprintln!("gridsweep failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::load()?;
    let conn = match settings.database.mode.as_str() {
        "file" => {
            let path = settings.database.path.clone().ok_or_else(|| {
                SweepError::Config("database.mode is 'file' but database.path is not set".to_string())
            })?;
            Connection::open(path)?
        }
        _ => Connection::open_in_memory()?,
    };
    ensure_schema(&conn, &settings)?;

    let mut dataset = DatasetMeta::new("primary", &settings.dataset.table);
    for column in &settings.dataset.identifier_columns {
        dataset = dataset.with_column(ColumnMeta::new(column, true));
    }
    if !settings.dataset.identifier_columns.contains(&settings.action.set_column) {
        dataset = dataset.with_column(ColumnMeta::new(&settings.action.set_column, false));
    }
    if let Some(filter) = &settings.dataset.base_filter {
        dataset = dataset.with_base_filter(filter.clone());
    }

    let mut engine = Engine::new(conn);
    engine.register_dataset(dataset);
    engine.register_action(
        ActionDefinition::new(&settings.action.name, "primary", column_update(&settings))
            .with_messages(ActionMessages {
                success: settings.messages.success.clone(),
                error: settings.messages.error.clone(),
                empty_selection: settings.messages.empty_selection.clone(),
                title: settings.messages.title.clone(),
                announce_empty_selection: settings.messages.announce_empty_selection,
            }),
    );

    let app = server::router(Arc::new(engine));
    let listener =
        tokio::net::TcpListener::bind((settings.server.host.as_str(), settings.server.port))
            .await
            .map_err(|e| {
                SweepError::Server(format!(
                    "cannot bind {}:{}: {e}",
                    settings.server.host, settings.server.port
                ))
            })?;
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        action = %settings.action.name,
        "gridsweep listening"
    );
    axum::serve(listener, app)
        .await
        .map_err(|e| SweepError::Server(e.to_string()))?;
    Ok(())
}

fn ensure_schema(conn: &Connection, settings: &Settings) -> Result<()> {
    let mut columns: Vec<String> = settings
        .dataset
        .identifier_columns
        .iter()
        .map(|c| format!("{c} text"))
        .collect();
    if !settings.dataset.identifier_columns.contains(&settings.action.set_column) {
        columns.push(format!("{} text", settings.action.set_column));
    }
    conn.execute_batch(&format!(
        "create table if not exists {} ({})",
        settings.dataset.table,
        columns.join(", ")
    ))?;
    Ok(())
}

/// The built-in action: set the configured column on each targeted row to the
/// value of the configured submitted item.
fn column_update(settings: &Settings) -> Arc<dyn gridsweep::process::RowMutation> {
    let table = settings.dataset.table.clone();
    let column = settings.action.set_column.clone();
    let item_name = settings.action.from_item.clone();
    let id_columns = settings.dataset.identifier_columns.clone();
    Arc::new(move |row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
        let value = scope.item(&item_name).map(str::to_string).ok_or_else(|| {
            SweepError::execution(100, format!("missing submitted item '{item_name}'"))
        })?;
        let mut sql = format!("update {table} set {column} = ?1 where ");
        let mut params: Vec<Value> = vec![Value::Text(value)];
        for (i, id_column) in id_columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(" and ");
            }
            sql.push_str(&format!("{id_column} = ?{}", i + 2));
            let cell = row.get(id_column).ok_or_else(|| {
                SweepError::execution(101, format!("row has no column '{id_column}'"))
            })?;
            params.push(cell.to_value());
        }
        scope.connection().execute(&sql, params_from_iter(params))?;
        Ok(())
    })
}
