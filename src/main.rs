use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use polystore::config::Config;
use polystore::core::types::{BackendType, ConnectionConfig, QueryRequest, QueryResult};
use polystore::utils::logging;
use polystore::Runtime;

#[derive(Parser)]
#[clap(version, author = "Polystore Contributors")]
struct Cli {
    /// 配置文件路径
    #[clap(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered backends and their capabilities
    Backends,
    /// Open and immediately close a connection
    Test {
        #[clap(flatten)]
        target: Target,
    },
    /// Connect, run a query and print the results as JSON
    Query {
        #[clap(flatten)]
        target: Target,
        #[clap(short, long)]
        query: String,
        #[clap(long)]
        page_size: Option<u32>,
        /// Follow page state until the result set is exhausted
        #[clap(long)]
        all_pages: bool,
    },
}

#[derive(Args)]
struct Target {
    #[clap(short, long)]
    backend: String,
    #[clap(long)]
    host: Option<String>,
    #[clap(long)]
    port: Option<u16>,
    #[clap(long)]
    uri: Option<String>,
    #[clap(short, long)]
    username: Option<String>,
    #[clap(long)]
    password: Option<String>,
    #[clap(short, long)]
    keyspace: Option<String>,
    #[clap(long)]
    database: Option<String>,
    #[clap(long)]
    datacenter: Option<String>,
}

impl Target {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            uri: self.uri.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            keyspace: self.keyspace.clone(),
            database: self.database.clone(),
            local_data_center: self.datacenter.clone(),
            ..Default::default()
        }
    }
}

fn load_config(path: &str) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load config from '{}': {}, using default config",
                path, e
            );
            Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    if let Err(e) = logging::init(&config) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let runtime = Runtime::from_config(config).await;
    let outcome = run(&runtime, cli.command).await;
    runtime.shutdown().await;
    logging::shutdown();
    outcome
}

async fn run(runtime: &Runtime, command: Command) -> Result<()> {
    match command {
        Command::Backends => {
            println!("{}", serde_json::to_string_pretty(&runtime.describe_backends())?);
        }
        Command::Test { target } => {
            let result = runtime
                .test_connection(&target.backend, &target.connection_config())
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Query {
            target,
            query,
            page_size,
            all_pages,
        } => {
            let backend: BackendType = target
                .backend
                .parse()
                .map_err(|t| anyhow::anyhow!("unknown backend type: {}", t))?;
            let connection = runtime
                .connect(backend, &target.connection_config())
                .await
                .context("connect failed")?;
            info!("Running query on session {}", connection.connection_id);

            let mut request = QueryRequest::new(query);
            request.page_size = page_size;
            let outcome = fetch(runtime, &connection.connection_id, request, all_pages).await;
            runtime.disconnect(&connection.connection_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome?)?);
        }
    }
    Ok(())
}

/// 按需跟随分页游标，把所有页合并为一个结果
async fn fetch(
    runtime: &Runtime,
    connection_id: &str,
    mut request: QueryRequest,
    all_pages: bool,
) -> Result<QueryResult> {
    let mut merged = runtime.execute_query(connection_id, &request).await?;
    while all_pages && merged.success && merged.page_state.is_some() {
        request.page_state = merged.page_state.take();
        let page = runtime.execute_query(connection_id, &request).await?;
        merged.execution_time_ms += page.execution_time_ms;
        if !page.success {
            return Ok(page);
        }
        merged.rows.extend(page.rows);
        merged.row_count = merged.rows.len();
        merged.page_state = page.page_state;
    }
    Ok(merged)
}
