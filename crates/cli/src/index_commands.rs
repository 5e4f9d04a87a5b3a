use std::path::PathBuf;

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    mailsage_config::MailsageConfig,
    mailsage_index::{EmailDocument, EmailMessage, SearchResults, sync_emails},
};

use crate::runtime;

#[derive(Subcommand)]
pub enum IndexAction {
    /// Load the account's index, creating an empty one if needed.
    Init {
        #[arg(long)]
        account: String,
    },
    /// Full-text search over indexed emails.
    Search {
        #[arg(long)]
        account: String,
        #[arg(long)]
        term: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Semantic search: emails closest in meaning to a prompt.
    Ask {
        #[arg(long)]
        account: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Embed and index emails from a JSON file (array of sync API messages).
    Sync {
        #[arg(long)]
        account: String,
        #[arg(long)]
        file: PathBuf,
    },
}

pub async fn handle_index(action: IndexAction, config: &MailsageConfig) -> Result<()> {
    let registry = runtime::registry(config).await?;
    match action {
        IndexAction::Init { account } => {
            let manager = registry.open(&account).await?;
            let count = manager.lock().await.document_count();
            println!("Index ready for {account} ({count} emails)");
        },
        IndexAction::Search {
            account,
            term,
            limit,
        } => {
            let manager = registry.open(&account).await?;
            let limit = limit.unwrap_or(registry.settings().default_limit);
            let results = manager.lock().await.search_with_limit(&term, limit).await?;
            print_results(&results);
        },
        IndexAction::Ask {
            account,
            prompt,
            limit,
        } => {
            let manager = registry.open(&account).await?;
            let results = manager.lock().await.vector_search(&prompt, limit).await?;
            print_results(&results);
        },
        IndexAction::Sync { account, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let emails: Vec<EmailMessage> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            let report = sync_emails(&registry, &account, emails).await?;
            println!("Indexed {} emails", report.indexed);
            if !report.failed.is_empty() {
                println!(
                    "Skipped {} emails (embedding failed): {}",
                    report.failed.len(),
                    report.failed.join(", ")
                );
            }
        },
    }
    Ok(())
}

fn print_results(results: &SearchResults<EmailDocument>) {
    if results.hits.is_empty() {
        println!("No matching emails.");
        return;
    }
    for hit in &results.hits {
        let doc = &hit.document;
        println!("{:>6.3}  {}", hit.score, doc.title);
        println!("        from {} · {} · thread {}", doc.from, doc.sent_at, doc.thread_id);
    }
    println!(
        "{} of {} matches ({:.1} ms)",
        results.hits.len(),
        results.count,
        results.elapsed.as_secs_f64() * 1000.0
    );
}
