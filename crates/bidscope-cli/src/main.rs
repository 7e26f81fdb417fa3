use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bidscope_client::{UpstreamClient, UpstreamConfig};
use bidscope_core::{NoticeIdentity, RawSearchRequest};
use bidscope_engine::{BookmarkIndex, EngineConfig, SearchPage, SearchService};
use bidscope_web::AppState;

#[derive(Debug, Parser)]
#[command(name = "bidscope-cli")]
#[command(about = "Public bid notice search and verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search notices across all three categories.
    Search {
        #[arg(long)]
        keyword: Option<String>,
        /// Start date, YYYYMMDD or YYYYMMDDHHMM.
        #[arg(long)]
        from: Option<String>,
        /// End date, YYYYMMDD or YYYYMMDDHHMM.
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show one notice with its fields classified.
    Detail {
        notice_no: String,
        #[arg(long, default_value_t = 0)]
        ord: u32,
    },
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },
}

fn search_service() -> Result<Arc<SearchService>> {
    let client = UpstreamClient::new(UpstreamConfig::from_env())?;
    Ok(Arc::new(SearchService::new(
        Arc::new(client),
        EngineConfig::from_env(),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            keyword,
            from,
            to,
            page,
        } => {
            let request = RawSearchRequest {
                bid_ntce_nm: keyword,
                from_bid_dt: from,
                to_bid_dt: to,
                ..RawSearchRequest::default()
            };
            let outcome = search_service()?
                .search(&request, SearchPage { page_no: page.max(1) })
                .await?;
            for item in &outcome.items {
                println!(
                    "{}  {}  {} ({})",
                    item.identity.display_key(),
                    item.posted_at,
                    item.title,
                    item.announcing_institution
                );
            }
            println!(
                "total={} calls={}/{} cached={}",
                outcome.meta.total_count,
                outcome.meta.successful_calls,
                outcome.meta.api_call_count,
                outcome.meta.from_cache
            );
            for warning in &outcome.meta.warnings {
                eprintln!("warning: {warning}");
            }
        }
        Commands::Detail { notice_no, ord } => {
            match search_service()?
                .detail(&NoticeIdentity::new(notice_no, ord))
                .await?
            {
                Some(detail) => {
                    println!(
                        "{}  {}",
                        detail.summary.identity.display_key(),
                        detail.summary.title
                    );
                    for field in detail
                        .amounts
                        .iter()
                        .chain(&detail.schedule)
                        .chain(&detail.qualifications)
                    {
                        println!("  {}: {}", field.label, field.display);
                    }
                    for attachment in &detail.attachments {
                        println!("  첨부파일: {}", attachment.url);
                    }
                }
                None => eprintln!("notice not found"),
            }
        }
        Commands::Serve { port } => {
            let state = AppState::new(search_service()?, BookmarkIndex::in_memory());
            bidscope_web::serve(state, port).await?;
        }
    }

    Ok(())
}
