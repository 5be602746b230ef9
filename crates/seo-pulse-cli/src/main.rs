mod settings;

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use seo_pulse_core::{
    classify, domain_from_file_name, render_comparison, render_distribution, render_groups,
    render_summary, render_value, AuditService, FileReportRepository, OutputFormat,
    StoredSnapshot, TAXONOMY,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "seo-pulse",
    author,
    version,
    about = "Health scores, issue groups and trends for website audit reports"
)]
struct Cli {
    /// Optional configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory containing report snapshots (*.json) and templates.json
    #[arg(long = "reports-dir", value_name = "DIR", global = true)]
    reports_dir: Option<PathBuf>,

    /// Restrict reports to a single tenant
    #[arg(long = "client", value_name = "ID", global = true)]
    client: Option<String>,

    /// Output format: human, json or yaml
    #[arg(long, value_name = "FORMAT", value_parser = parse_format, global = true)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score and annotate the latest report, comparing it with the previous one when available
    Summary {
        #[arg(long)]
        domain: String,
    },
    /// Compare the two most recent reports of a domain
    Compare {
        #[arg(long)]
        domain: String,
    },
    /// Group the latest report's issues by taxonomy
    Groups {
        #[arg(long)]
        domain: String,
    },
    /// URLs per taxonomy group and issues per priority in the latest report
    Distribution {
        #[arg(long)]
        domain: String,
    },
    /// List domains that have reports
    Domains,
    /// Convert an issues overview CSV export into a report snapshot
    Import {
        /// CSV export with Issue Name, Issue Type, Issue Priority, URLs and % of Total columns
        #[arg(value_name = "FILE")]
        csv: PathBuf,
        /// Domain of the report; guessed from the file name when omitted
        #[arg(long)]
        domain: Option<String>,
        /// Scan timestamp (RFC 3339); defaults to now
        #[arg(long = "scan-date", value_name = "TIMESTAMP")]
        scan_date: Option<DateTime<Utc>>,
        /// Snapshot path; defaults to a file named after domain and date in the reports directory
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Replace an existing snapshot file
        #[arg(long)]
        force: bool,
    },
    /// Print the taxonomy group for each issue name
    Classify {
        #[arg(required = true, value_name = "ISSUE_NAME")]
        names: Vec<String>,
    },
    /// Print the taxonomy table
    Taxonomy,
}

fn parse_format(raw: &str) -> Result<OutputFormat, String> {
    raw.parse().map_err(|err: anyhow::Error| err.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?.with_overrides(
        cli.reports_dir,
        cli.client,
        cli.format,
    );
    debug!(?settings, "settings resolved");

    match cli.command.unwrap_or(Commands::Domains) {
        Commands::Summary { domain } => summary(&settings, &domain).await?,
        Commands::Compare { domain } => compare(&settings, &domain).await?,
        Commands::Groups { domain } => groups(&settings, &domain).await?,
        Commands::Distribution { domain } => distribution(&settings, &domain).await?,
        Commands::Domains => domains(&settings).await?,
        Commands::Import {
            csv,
            domain,
            scan_date,
            output,
            force,
        } => import(&settings, &csv, domain, scan_date, output, force)?,
        Commands::Classify { names } => classify_names(&names, settings.format)?,
        Commands::Taxonomy => taxonomy(settings.format)?,
    }
    Ok(())
}

fn service(settings: &Settings) -> AuditService<FileReportRepository> {
    AuditService::new(Arc::new(FileReportRepository::new(&settings.reports_dir)))
}

async fn summary(settings: &Settings, domain: &str) -> Result<()> {
    let response = service(settings)
        .summary(settings.client_id.as_deref(), domain)
        .await
        .with_context(|| format!("failed to summarize reports for {domain}"))?;
    print!("{}", render_summary(&response, settings.format)?);
    Ok(())
}

async fn compare(settings: &Settings, domain: &str) -> Result<()> {
    let comparison = service(settings)
        .compare(settings.client_id.as_deref(), domain)
        .await
        .with_context(|| format!("failed to compare reports for {domain}"))?;
    print!("{}", render_comparison(&comparison, settings.format)?);
    Ok(())
}

async fn groups(settings: &Settings, domain: &str) -> Result<()> {
    let groups = service(settings)
        .groups(settings.client_id.as_deref(), domain)
        .await
        .with_context(|| format!("failed to group issues for {domain}"))?;
    print!("{}", render_groups(&groups, settings.format)?);
    Ok(())
}

async fn distribution(settings: &Settings, domain: &str) -> Result<()> {
    let distribution = service(settings)
        .distribution(settings.client_id.as_deref(), domain)
        .await
        .with_context(|| format!("failed to summarize issue distribution for {domain}"))?;
    print!("{}", render_distribution(&distribution, settings.format)?);
    Ok(())
}

fn import(
    settings: &Settings,
    csv: &Path,
    domain: Option<String>,
    scan_date: Option<DateTime<Utc>>,
    output: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let domain = domain
        .or_else(|| domain_from_file_name(csv))
        .ok_or_else(|| anyhow!("cannot infer a domain from {}; pass --domain", csv.display()))?;
    let file = File::open(csv).with_context(|| format!("failed to open {}", csv.display()))?;
    let snapshot = StoredSnapshot::from_overview(
        file,
        domain,
        settings.client_id.clone(),
        scan_date.unwrap_or_else(Utc::now),
    )
    .with_context(|| format!("failed to import {}", csv.display()))?;
    let path = output.unwrap_or_else(|| settings.reports_dir.join(snapshot.file_name()));
    snapshot.write_to(&path, force)?;
    info!(
        path = %path.display(),
        issues = snapshot.report.issues.len(),
        "report snapshot written"
    );

    match settings.format {
        OutputFormat::Human => println!(
            "Imported {} issue(s) for {} into {}",
            snapshot.report.issues.len(),
            snapshot.report.domain,
            path.display()
        ),
        structured => {
            let outcome = serde_json::json!({
                "path": path,
                "domain": snapshot.report.domain,
                "totalIssues": snapshot.metadata.totals.total_issues,
                "totalUrls": snapshot.metadata.totals.total_urls,
            });
            print!("{}", render_value(&outcome, structured)?);
        }
    }
    Ok(())
}

async fn domains(settings: &Settings) -> Result<()> {
    let domains = service(settings)
        .domains(settings.client_id.as_deref())
        .await
        .with_context(|| {
            format!(
                "failed to list domains in {}",
                settings.reports_dir.display()
            )
        })?;
    match settings.format {
        OutputFormat::Human => {
            println!(
                "{} domain(s) in {}",
                domains.len(),
                settings.reports_dir.display()
            );
            for domain in domains {
                println!("- {domain}");
            }
        }
        structured => print!("{}", render_value(&domains, structured)?),
    }
    Ok(())
}

fn classify_names(names: &[String], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Human {
        for name in names {
            println!("{name} => {}", classify(Some(name)));
        }
        return Ok(());
    }
    let entries: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "issueName": name, "group": classify(Some(name)) }))
        .collect();
    print!("{}", render_value(&entries, format)?);
    Ok(())
}

fn taxonomy(format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Human {
        let table: Vec<_> = TAXONOMY
            .iter()
            .map(|(group, patterns)| serde_json::json!({ "group": group, "patterns": patterns }))
            .collect();
        print!("{}", render_value(&table, format)?);
        return Ok(());
    }
    println!("{} group(s), first match wins", TAXONOMY.len());
    for (group, patterns) in TAXONOMY {
        println!("- {group:<18} {}", patterns.join(", "));
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
