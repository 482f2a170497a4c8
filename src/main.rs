//! letterbox - command-line entry point for the newsletter engine

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;

use letterbox::auth::OAuthClients;
use letterbox::classifier::{Classifier, RuleSet};
use letterbox::config::Settings;
use letterbox::domain::{AccountId, CandidateMessage, EmailAccount, ProviderKind};
use letterbox::providers::{AdapterOptions, HttpProviderFactory};
use letterbox::services::{NewsletterService, SyncService};
use letterbox::storage::{queries, StorageLayer};

const USAGE: &str = "\
usage:
  letterbox accounts
  letterbox authorize <gmail|outlook>
  letterbox connect <gmail|outlook> <email> <authorization-code>
  letterbox newsletter-mode <account-id> <on|off>
  letterbox preview <account-id>
  letterbox sync <account-id> [accepted-domain...]
  letterbox classify <message.json>
  letterbox remove <account-id> [reassign-to-account-id]";

/// Owner recorded on accounts connected from the command line.
const LOCAL_USER: &str = "local";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args).await {
        tracing::error!(error = %e, "letterbox failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<()> {
    let command = args.first().map(String::as_str);
    let arg = |index: usize| -> Result<&str> {
        args.get(index)
            .map(String::as_str)
            .with_context(|| format!("missing argument\n{USAGE}"))
    };

    let settings = Settings::load().context("failed to load settings")?;

    match command {
        Some("classify") => {
            let classifier = build_classifier(&settings)?;
            let raw = std::fs::read_to_string(arg(1)?).context("failed to read message file")?;
            let message: CandidateMessage =
                serde_json::from_str(&raw).context("message file is not a valid message")?;
            print_json(&classifier.classify(&message))
        }
        Some("accounts") => {
            let storage = open_storage(&settings).await?;
            let accounts: Vec<serde_json::Value> = queries::accounts::get_all(storage.db())
                .await?
                .into_iter()
                .map(|a| {
                    serde_json::json!({
                        "id": a.id,
                        "email": a.email,
                        "provider": a.provider,
                        "last_synced_at": a.last_synced_at,
                        "newsletter_mode": a.newsletter_mode,
                    })
                })
                .collect();
            print_json(&accounts)
        }
        Some("authorize") => {
            let provider = parse_provider(arg(1)?)?;
            let clients = OAuthClients::from_settings(&settings.oauth)?;
            let (url, state) = clients.client(provider)?.authorize_url();
            println!("{url}");
            eprintln!("state: {}", state.secret());
            Ok(())
        }
        Some("connect") => {
            let provider = parse_provider(arg(1)?)?;
            let email = arg(2)?;
            let code = arg(3)?;
            let clients = OAuthClients::from_settings(&settings.oauth)?;
            let tokens = clients.client(provider)?.exchange_code(code).await?;

            let mut account = EmailAccount::new(
                format!("acc-{}", uuid::Uuid::new_v4()),
                LOCAL_USER,
                email,
                provider,
            );
            account.access_token = Some(tokens.access_token);
            account.refresh_token = tokens.refresh_token;
            account.token_expires_at = tokens
                .expires_in
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| Utc::now() + d);

            let storage = open_storage(&settings).await?;
            queries::accounts::insert(storage.db(), &account).await?;
            tracing::info!(account_id = %account.id, provider = %provider, "connected account");
            print_json(&account.id)
        }
        Some("newsletter-mode") => {
            let account_id = AccountId::from(arg(1)?);
            let enabled = match arg(2)? {
                "on" => true,
                "off" => false,
                other => bail!("expected on or off, got {other}"),
            };
            let storage = open_storage(&settings).await?;
            queries::accounts::set_newsletter_mode(storage.db(), &account_id, enabled).await?;
            Ok(())
        }
        Some("preview") => {
            let account_id = AccountId::from(arg(1)?);
            let service = build_sync_service(&settings).await?;
            print_json(&service.preview_newsletters(&account_id).await?)
        }
        Some("sync") => {
            let account_id = AccountId::from(arg(1)?);
            let domains: Vec<String> = args.iter().skip(2).cloned().collect();
            let accepted = (!domains.is_empty()).then_some(domains);
            let service = build_sync_service(&settings).await?;
            let report = service
                .sync_newsletters_report(&account_id, accepted.as_deref())
                .await?;
            print_json(&report)
        }
        Some("remove") => {
            let account_id = AccountId::from(arg(1)?);
            let target = args.get(2).map(|id| AccountId::from(id.as_str()));
            let storage = open_storage(&settings).await?;
            let service = NewsletterService::new(storage);
            print_json(&service.remove_account(&account_id, target.as_ref()).await?)
        }
        _ => bail!("{USAGE}"),
    }
}

fn parse_provider(name: &str) -> Result<ProviderKind> {
    ProviderKind::parse(&name.to_lowercase())
        .with_context(|| format!("unknown provider {name}, expected gmail or outlook"))
}

fn build_classifier(settings: &Settings) -> Result<Classifier> {
    let rules = match settings.classifier.rules_path.as_deref() {
        Some(path) => load_rules(path)?,
        None => RuleSet::default(),
    };
    Ok(Classifier::new(rules)?)
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    RuleSet::load(path).with_context(|| format!("failed to load rules from {}", path.display()))
}

async fn open_storage(settings: &Settings) -> Result<Arc<StorageLayer>> {
    let path = settings.database_path()?;
    let storage = StorageLayer::new(&path)
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(storage.into_arc())
}

async fn build_sync_service(settings: &Settings) -> Result<SyncService<StorageLayer, OAuthClients>> {
    let storage = open_storage(settings).await?;
    let oauth = OAuthClients::from_settings(&settings.oauth)?;
    let factory = Arc::new(HttpProviderFactory::new(AdapterOptions::from(&settings.sync)));
    let classifier = build_classifier(settings)?;

    Ok(SyncService::new(
        storage,
        oauth,
        factory,
        classifier,
        settings.sync.clone(),
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
