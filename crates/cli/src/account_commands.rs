use {anyhow::Result, clap::Subcommand, mailsage_config::MailsageConfig};

use crate::runtime;

#[derive(Subcommand)]
pub enum AccountAction {
    /// Register an email account so it can be indexed.
    Add {
        /// Account id used by the mail provider.
        #[arg(long)]
        id: String,
        /// Mailbox address, for display only.
        #[arg(long)]
        email: Option<String>,
    },
    /// List registered accounts and whether they have an index.
    List,
}

pub async fn handle_accounts(action: AccountAction, config: &MailsageConfig) -> Result<()> {
    let store = runtime::connect_store(config).await?;
    match action {
        AccountAction::Add { id, email } => {
            store.create_account(&id, email.as_deref()).await?;
            println!("Registered account {id}");
        },
        AccountAction::List => {
            let accounts = store.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts registered.");
                return Ok(());
            }
            println!("{:<30} {:<35} INDEX", "ID", "EMAIL");
            for account in accounts {
                let index = account
                    .binary_index
                    .as_ref()
                    .map_or("none".to_string(), |b| format!("{} bytes", b.len()));
                println!(
                    "{:<30} {:<35} {index}",
                    account.id,
                    account.email_address.as_deref().unwrap_or("-")
                );
            }
        },
    }
    Ok(())
}
