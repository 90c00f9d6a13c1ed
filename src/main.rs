use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use hiring_pipeline_lib::core::config::AppConfig;
use hiring_pipeline_lib::core::errors::CoreError;
use hiring_pipeline_lib::core::jd_matcher::JdKeywordSet;
use hiring_pipeline_lib::core::models::{FitLabel, RoleRef};
use hiring_pipeline_lib::core::notifications::{ChannelSelection, MessageTemplates};
use hiring_pipeline_lib::core::review::{ApprovalFilter, CandidateFilter};
use hiring_pipeline_lib::core::roles::{role_name_from_jd_file, RoleRegistry};
use hiring_pipeline_lib::core::service::{load_jd_text, ScreeningService};

#[derive(Parser)]
#[command(name = "hiring-pipeline")]
#[command(about = "Screen resumes against a job description and contact approved candidates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract contact fields from a single resume
    Parse { resume: PathBuf },
    /// Score one resume against a job description without storing it
    Evaluate {
        #[arg(long)]
        jd: PathBuf,
        resume: PathBuf,
    },
    /// Screen resumes against a job description and store the candidates
    Screen(ScreenArgs),
    /// List stored candidates
    Review {
        #[command(flatten)]
        filter: FilterArgs,
        /// Print counts per label and approval state instead of rows
        #[arg(long)]
        summary: bool,
    },
    /// Mark candidates as HR-approved
    Approve(ApprovalArgs),
    /// Clear HR approval
    Reject(ApprovalArgs),
    /// Email and/or WhatsApp every approved candidate
    Notify {
        /// Send emails; without --email or --whatsapp both channels are used
        #[arg(long)]
        email: bool,
        /// Send WhatsApp messages
        #[arg(long)]
        whatsapp: bool,
        #[arg(long)]
        email_template: Option<PathBuf>,
        #[arg(long)]
        whatsapp_template: Option<PathBuf>,
    },
    /// Manage job roles
    Roles {
        #[command(subcommand)]
        command: RoleCommand,
    },
}

#[derive(Args)]
struct ScreenArgs {
    /// Job description text file
    #[arg(long)]
    jd: PathBuf,
    /// Folder of .pdf/.docx resumes
    #[arg(long, conflicts_with = "files")]
    dir: Option<PathBuf>,
    /// Individual resume files
    files: Vec<PathBuf>,
    /// Existing role id; defaults to the role named after the JD file
    #[arg(long)]
    role_id: Option<String>,
    #[arg(long)]
    source_portal: Option<String>,
}

#[derive(Args)]
struct FilterArgs {
    /// Fit labels to include (e.g. strong, good); repeatable
    #[arg(long = "label")]
    labels: Vec<String>,
    /// all, approved or pending
    #[arg(long, default_value = "all")]
    status: String,
    /// Case-insensitive candidate name substring
    #[arg(long)]
    name: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<CandidateFilter> {
        let labels = self
            .labels
            .iter()
            .map(|label| label.parse::<FitLabel>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CandidateFilter {
            labels,
            approval: self.status.parse::<ApprovalFilter>()?,
            name_search: self.name.clone(),
        })
    }
}

#[derive(Args)]
struct ApprovalArgs {
    /// Data row numbers as shown by `review`
    rows: Vec<usize>,
    /// Apply to every candidate matching the filter instead of listed rows
    #[arg(long, conflicts_with = "rows")]
    all_filtered: bool,
    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Subcommand)]
enum RoleCommand {
    /// List roles (active only unless --all)
    List {
        #[arg(long)]
        all: bool,
    },
    /// Register a role for a job description file
    Add {
        jd_file: PathBuf,
        /// Defaults to a name derived from the file name
        #[arg(long)]
        name: Option<String>,
    },
    Activate { role_id: String },
    Deactivate { role_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    init_tracing(&config.rust_log);

    match cli.command {
        Command::Parse { resume } => {
            let service = ScreeningService::from_config(config)?;
            match service.parser().parse_resume(&resume).await {
                Ok(parsed) => print_json(&serde_json::json!({
                    "sourceFile": parsed.source_file,
                    "route": parsed.route,
                    "fields": parsed.fields,
                }))?,
                Err(skipped) => print_json(&skipped)?,
            }
        }
        Command::Evaluate { jd, resume } => {
            let service = ScreeningService::from_config(config)?;
            let keywords = JdKeywordSet::from_jd_text(&load_jd_text(&jd).await?);
            match service.parser().parse_resume(&resume).await {
                Ok(parsed) => print_json(&keywords.evaluate(&parsed.resume_text))?,
                Err(skipped) => print_json(&skipped)?,
            }
        }
        Command::Screen(args) => screen(config, args).await?,
        Command::Review { filter, summary } => {
            let service = ScreeningService::from_config(config)?;
            if summary {
                print_json(&service.review_summary().await?)?;
            } else {
                print_json(&service.list_candidates(&filter.to_filter()?).await?)?;
            }
        }
        Command::Approve(args) => set_approval(config, args, true).await?,
        Command::Reject(args) => set_approval(config, args, false).await?,
        Command::Notify {
            email,
            whatsapp,
            email_template,
            whatsapp_template,
        } => {
            let channels = if email || whatsapp {
                ChannelSelection { email, whatsapp }
            } else {
                ChannelSelection::default()
            };
            let templates =
                MessageTemplates::load(email_template.as_deref(), whatsapp_template.as_deref())
                    .await?;
            let service = ScreeningService::from_config(config)?;
            print_json(&service.notify_approved(templates, channels).await?)?;
        }
        Command::Roles { command } => roles(config, command).await?,
    }

    Ok(())
}

fn init_tracing(rust_log: &str) {
    let filter = if rust_log.contains('=') || rust_log.contains(',') {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(format!(
            "hiring_pipeline={rust_log},hiring_pipeline_lib={rust_log}"
        ))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn screen(config: AppConfig, args: ScreenArgs) -> Result<()> {
    let jd_text = load_jd_text(&args.jd).await?;
    let role = resolve_role(&config, &args.jd, args.role_id.as_deref()).await?;
    let service = ScreeningService::from_config(config)?;
    let source_portal = args.source_portal.as_deref();

    let report = match &args.dir {
        Some(dir) => {
            service
                .screen_directory(dir, &jd_text, &role, source_portal)
                .await?
        }
        None if !args.files.is_empty() => {
            service
                .screen_files(&args.files, &jd_text, &role, source_portal)
                .await
        }
        None => {
            return Err(CoreError::InvalidRequest(
                "pass --dir or at least one resume file".to_string(),
            )
            .into())
        }
    };

    print_json(&report)
}

/// Uses the requested role, else the registered role named after the JD
/// file, registering it on first use.
async fn resolve_role(config: &AppConfig, jd_path: &Path, role_id: Option<&str>) -> Result<RoleRef> {
    let mut registry = RoleRegistry::open(config.roles_file.clone()).await?;

    if let Some(role_id) = role_id {
        return registry
            .find_by_id(role_id)
            .map(|role| role.role_ref())
            .ok_or_else(|| CoreError::RoleNotFound(role_id.to_string()).into());
    }

    let role_name = role_name_from_jd_file(jd_path);
    if let Some(role) = registry.find_by_name(&role_name) {
        return Ok(role.role_ref());
    }

    let role = registry
        .add(&role_name, &jd_path.display().to_string())
        .await?;
    info!("Registered new role {} ({})", role.role_name, role.role_id);
    Ok(role.role_ref())
}

async fn set_approval(config: AppConfig, args: ApprovalArgs, approved: bool) -> Result<()> {
    let service = ScreeningService::from_config(config)?;

    let changed = if args.all_filtered {
        service
            .set_filtered_approval(&args.filter.to_filter()?, approved)
            .await?
    } else {
        if args.rows.is_empty() {
            return Err(CoreError::InvalidRequest(
                "pass row numbers or --all-filtered".to_string(),
            )
            .into());
        }
        service.set_rows_approval(&args.rows, approved).await?
    };

    print_json(&serde_json::json!({ "changed": changed, "approved": approved }))
}

async fn roles(config: AppConfig, command: RoleCommand) -> Result<()> {
    let mut registry = RoleRegistry::open(config.roles_file).await?;

    match command {
        RoleCommand::List { all } => {
            if all {
                print_json(&registry.roles())?;
            } else {
                print_json(&registry.active_roles())?;
            }
        }
        RoleCommand::Add { jd_file, name } => {
            let name = name.unwrap_or_else(|| role_name_from_jd_file(&jd_file));
            let role = registry.add(&name, &jd_file.display().to_string()).await?;
            print_json(&role)?;
        }
        RoleCommand::Activate { role_id } => {
            registry.set_active(&role_id, true).await?;
            info!("Activated {role_id}");
        }
        RoleCommand::Deactivate { role_id } => {
            registry.set_active(&role_id, false).await?;
            info!("Deactivated {role_id}");
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
