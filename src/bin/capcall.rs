//! capcall CLI: operator interface to the capital call store.

use std::sync::Arc;

use capital_call_rs::CapitalCallService;
use capital_call_rs::auth::{Authorizer, PolicyAuthorizer};
use capital_call_rs::config::Config;
use capital_call_rs::config::secrets::ExposeSecret;
use capital_call_rs::model::{
    Actor, BreakdownInput, CapitalCallDetail, CapitalCallId, CapitalCallRequest, CountRequest,
    Pagination, Queue, QueueCountFilter, SearchFilter, SearchQuery, SortDirection, SortField,
};
use capital_call_rs::store::PgStore;
use capital_call_rs::telemetry::{TelemetryConfig, init_telemetry};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "capcall", about = "Capital call workflow operations")]
struct Cli {
    /// Identity the action is performed as
    #[arg(long, global = true, env = "CAPITAL_CALL_ACTOR", default_value = "operator")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Create a capital call (DRAFT, locked by the actor)
    Create(CallFields),
    /// Replace a capital call's fields and breakdowns
    Update {
        id: CapitalCallId,
        #[command(flatten)]
        fields: CallFields,
        /// Fail if the stored version differs
        #[arg(long)]
        expected_version: Option<i64>,
    },
    /// Show one capital call with its breakdowns
    Show { id: CapitalCallId },
    /// Search capital calls
    Search {
        /// Filter as key=value (batchId, referenceId, workflowStatus, clientName,
        /// fromDate, toDate, dayType, queue, lockedBy)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<SearchFilter>,
        /// Sort as field[:asc|desc]
        #[arg(long, value_parser = parse_sort)]
        sort: Vec<(SortField, SortDirection)>,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = Pagination::DEFAULT_SIZE)]
        size: u32,
    },
    /// DRAFT → SUBMITTED
    Submit { id: CapitalCallId },
    /// SUBMITTED → APPROVED
    Approve { id: CapitalCallId },
    /// SUBMITTED → REJECTED
    Reject { id: CapitalCallId },
    /// Clear the edit lock
    Unlock { id: CapitalCallId },
    /// Count capital calls per queue
    Counts {
        /// Queues, in the order they should be reported
        #[arg(required = true)]
        queues: Vec<Queue>,
        #[arg(long)]
        date_from: Option<NaiveDate>,
        #[arg(long)]
        date_to: Option<NaiveDate>,
        #[arg(long)]
        batch_id: Option<String>,
        #[arg(long)]
        reference_id: Option<String>,
    },
}

#[derive(Args)]
struct CallFields {
    #[arg(long)]
    batch_id: String,
    #[arg(long)]
    amount: Decimal,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    day_type: Option<String>,
    #[arg(long)]
    queue: Option<Queue>,
    #[arg(long)]
    client: Option<String>,
    #[arg(long)]
    asset: Option<String>,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    sensitive: bool,
    /// Allocation as CATEGORY=PERCENT, repeatable
    #[arg(long = "breakdown", value_parser = parse_breakdown)]
    breakdowns: Vec<BreakdownInput>,
}

impl CallFields {
    fn into_request(self) -> CapitalCallRequest {
        CapitalCallRequest {
            batch_id: self.batch_id,
            from_date: self.from,
            to_date: self.to,
            day_type: self.day_type,
            total_amount: self.amount,
            queue: self.queue,
            client_name: self.client,
            asset_description: self.asset,
            reference_id: self.reference,
            is_sensitive: self.sensitive,
            breakdowns: self.breakdowns,
            expected_version: None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(
        TelemetryConfig::new("capcall")
            .endpoint(config.otel_endpoint.clone())
            .log_level(config.log_level.clone()),
    )?;

    let store = PgStore::connect(config.database_url.expose_secret()).await?;
    store.migrate().await?;
    if let Command::Migrate = cli.command {
        println!("Migrations applied.");
        return Ok(());
    }

    let authorizer: Arc<dyn Authorizer> = match &config.policy_path {
        Some(path) => Arc::new(PolicyAuthorizer::load_from_file(path)?),
        None => Arc::new(PolicyAuthorizer::allow_all()),
    };
    let service = CapitalCallService::new(Arc::new(store), authorizer, config.service);
    let actor = Actor::new(cli.actor);

    match cli.command {
        Command::Migrate => {}
        Command::Create(fields) => {
            let detail = service.create(&fields.into_request(), &actor).await?;
            print_detail(&detail)?;
        }
        Command::Update {
            id,
            fields,
            expected_version,
        } => {
            let mut request = fields.into_request();
            request.expected_version = expected_version;
            let detail = service.update(id, &request, &actor).await?;
            print_detail(&detail)?;
        }
        Command::Show { id } => print_detail(&service.get_by_id(id, &actor).await?)?,
        Command::Search {
            filters,
            sort,
            page,
            size,
        } => {
            let mut query = SearchQuery::new().page(Pagination::new(page, size));
            query.filters = filters;
            for (field, direction) in sort {
                query = query.sort_by(field, direction);
            }
            cmd_search(&service, &query, &actor).await?;
        }
        Command::Submit { id } => print_detail(&service.submit(id, &actor).await?)?,
        Command::Approve { id } => print_detail(&service.approve(id, &actor).await?)?,
        Command::Reject { id } => print_detail(&service.reject(id, &actor).await?)?,
        Command::Unlock { id } => {
            service.unlock(id, &actor).await?;
            println!("Unlocked {id}");
        }
        Command::Counts {
            queues,
            date_from,
            date_to,
            batch_id,
            reference_id,
        } => {
            let request = CountRequest::new(queues).filter(QueueCountFilter {
                date_from,
                date_to,
                batch_id,
                reference_id,
            });
            let counts = service.get_counts_by_queue(&request, &actor).await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}

async fn cmd_search(
    service: &CapitalCallService,
    query: &SearchQuery,
    actor: &Actor,
) -> anyhow::Result<()> {
    let page = service.search(query, actor).await?;
    if page.items.is_empty() {
        println!("No capital calls found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<10}  {:>14}  {:<10}  {:<16}  {:<12}  CREATED",
        "ID", "BATCH", "AMOUNT", "STATUS", "QUEUE", "LOCKED_BY"
    );
    println!("{}", "-".repeat(96));

    for item in &page.items {
        let id = item.id.to_string();
        println!(
            "{:<8}  {:<10}  {:>14}  {:<10}  {:<16}  {:<12}  {}",
            &id[..8],
            item.batch_id,
            item.total_amount,
            item.workflow_status,
            item.queue,
            item.locked_by.as_deref().unwrap_or("-"),
            item.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!(
        "\n{} of {} (page {}, size {})",
        page.items.len(),
        page.total,
        page.page,
        page.size
    );
    Ok(())
}

fn print_detail(detail: &CapitalCallDetail) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(detail)?);
    Ok(())
}

fn parse_breakdown(s: &str) -> Result<BreakdownInput, String> {
    let (category, percentage) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=PERCENT, got {s:?}"))?;
    Ok(BreakdownInput {
        category: category.parse().map_err(|e| format!("{e}"))?,
        percentage: percentage
            .parse()
            .map_err(|e| format!("bad percentage {percentage:?}: {e}"))?,
    })
}

fn parse_filter(s: &str) -> Result<SearchFilter, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    SearchFilter::parse(key, value).map_err(|e| e.to_string())
}

fn parse_sort(s: &str) -> Result<(SortField, SortDirection), String> {
    let (field, direction) = s.split_once(':').unwrap_or((s, "desc"));
    let field = field.parse::<SortField>().map_err(|e| e.to_string())?;
    let direction = match direction {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => return Err(format!("sort direction must be asc or desc, got {other:?}")),
    };
    Ok((field, direction))
}
