//! Command-line interface and command execution.

use std::path::PathBuf;
use std::sync::Arc;

use budgetdesk_core::{BudgetRequestId, DepartmentId, ExpenseCategoryId, SupplierId};
use budgetdesk_platform_access::LoginFlow;
use budgetdesk_portal_api::{
    BudgetRequestUpdate, CatalogKind, EmailMessage, NewBudgetRequest, RequestFilter,
    RequestStatus, ReviewDecision,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rootcause::prelude::Report;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::callback::{self, CallbackState};
use crate::config::ClientConfig;
use crate::context::{AppContext, api_error};
use crate::error::CliError;
use crate::render;

/// Client for the budget request portal.
#[derive(Debug, Parser)]
#[command(name = "budgetdesk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in through the browser.
    Login,
    /// Forget the stored session.
    Logout,
    /// Show what the route guard decides for a path.
    Status {
        /// Role the route requires.
        #[arg(long)]
        role: Option<String>,
        /// Route to evaluate; defaults to the landing path.
        #[arg(long)]
        path: Option<String>,
    },
    /// Show the signed-in user.
    Whoami,
    /// Work with budget requests.
    #[command(subcommand)]
    Requests(RequestsCommand),
    /// Work with reference catalogs.
    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(Debug, Subcommand)]
pub enum RequestsCommand {
    /// List budget requests.
    List {
        #[arg(long)]
        status: Option<RequestStatus>,
        #[arg(long)]
        department: Option<DepartmentId>,
        /// Requester's employee number.
        #[arg(long)]
        employee: Option<String>,
    },
    /// Show one budget request.
    Show { id: BudgetRequestId },
    /// Submit a new budget request.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        department: DepartmentId,
        #[arg(long)]
        category: ExpenseCategoryId,
        #[arg(long)]
        supplier: Option<SupplierId>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        currency: Option<String>,
    },
    /// Change fields of a budget request.
    Update {
        id: BudgetRequestId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        department: Option<DepartmentId>,
        #[arg(long)]
        category: Option<ExpenseCategoryId>,
        #[arg(long)]
        supplier: Option<SupplierId>,
    },
    /// Approve a budget request (administrators).
    Approve {
        id: BudgetRequestId,
        #[command(flatten)]
        review: ReviewArgs,
    },
    /// Reject a budget request (administrators).
    Reject {
        id: BudgetRequestId,
        #[command(flatten)]
        review: ReviewArgs,
    },
}

#[derive(Debug, clap::Args)]
pub struct ReviewArgs {
    /// Comment recorded with the decision.
    #[arg(long)]
    comment: Option<String>,
    /// Email address to notify of the decision; repeatable.
    #[arg(long = "notify")]
    notify: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List a catalog: departments, suppliers or expense-categories.
    List { kind: CatalogKind },
    /// Import a CSV file into a catalog (administrators).
    Import { kind: CatalogKind, file: PathBuf },
}

/// Runs a parsed command line.
///
/// # Errors
///
/// Returns the failure of the command.
pub async fn run(cli: Cli) -> Result<(), Report<CliError>> {
    let config = ClientConfig::from_env().map_err(|e| CliError::Configuration {
        reason: e.to_string(),
    })?;
    let context = AppContext::build(config).await?;

    match cli.command {
        Command::Login => login(&context).await,
        Command::Logout => {
            context.manager.logout();
            println!("Signed out.");
            Ok(())
        }
        Command::Status { role, path } => status(&context, role.as_deref(), path.as_deref()).await,
        Command::Whoami => whoami(&context).await,
        Command::Requests(command) => requests(&context, command).await,
        Command::Catalog(command) => catalog(&context, command).await,
    }
}

async fn login(context: &AppContext) -> Result<(), Report<CliError>> {
    if !context.auth_enabled {
        println!("Authentication is disabled for this deployment.");
        return Ok(());
    }

    let callback = &context.config.callback;
    let listener = TcpListener::bind((callback.host.as_str(), callback.port))
        .await
        .map_err(|e| CliError::Listener {
            details: format!("cannot listen on {}:{}: {e}", callback.host, callback.port),
        })?;

    let mut flow = LoginFlow::new(Arc::clone(&context.manager));
    flow.start().await.map_err(|report| CliError::Login {
        message: report.current_context().user_message(),
    })?;
    info!(
        redirect_uri = %context.manager.redirect_uri(),
        "waiting for identity provider callback"
    );

    let (completed_tx, completed_rx) = mpsc::channel(1);
    let state = Arc::new(CallbackState::new(
        flow,
        &context.config.landing_path,
        completed_tx,
    ));
    callback::serve_until_complete(listener, state, completed_rx, callback.timeout()).await?;

    match context.manager.identity_claims() {
        Some(claims) => match claims.display_name() {
            Some(name) => println!("Signed in as {name}."),
            None => println!("Signed in."),
        },
        None => println!("Signed in."),
    }
    Ok(())
}

async fn status(
    context: &AppContext,
    role: Option<&str>,
    path: Option<&str>,
) -> Result<(), Report<CliError>> {
    let path = path.unwrap_or(context.gate.landing_path());
    let decision = context.gate.evaluate_route(path, role).await;
    let rendered = serde_json::to_string_pretty(&decision).map_err(|e| CliError::Output {
        details: e.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}

async fn whoami(context: &AppContext) -> Result<(), Report<CliError>> {
    context.require_session().await?;
    let profile = context.client.current_user().await.map_err(api_error)?;
    let token = context.manager.store().access_token();
    println!("{}", render::profile(&profile, token.as_deref(), Utc::now()));
    Ok(())
}

async fn requests(context: &AppContext, command: RequestsCommand) -> Result<(), Report<CliError>> {
    match command {
        RequestsCommand::List {
            status,
            department,
            employee,
        } => {
            context.require_session().await?;
            let filter = RequestFilter {
                status,
                department_id: department,
                employee_number: employee,
            };
            let requests = context
                .client
                .list_budget_requests(&filter)
                .await
                .map_err(api_error)?;
            if requests.is_empty() {
                println!("No budget requests.");
            }
            for request in &requests {
                println!("{}", render::request_line(request));
            }
        }
        RequestsCommand::Show { id } => {
            context.require_session().await?;
            let request = context
                .client
                .get_budget_request(id)
                .await
                .map_err(api_error)?;
            println!("{}", render::request_details(&request));
        }
        RequestsCommand::Create {
            title,
            amount,
            department,
            category,
            supplier,
            description,
            currency,
        } => {
            context.require_session().await?;
            let employee_number = context
                .manager
                .user_profile()
                .await
                .ok()
                .and_then(|profile| profile.employee_number().map(str::to_string));
            let new = NewBudgetRequest {
                title,
                description,
                amount,
                currency,
                department_id: department,
                supplier_id: supplier,
                expense_category_id: category,
                employee_number,
            };
            let created = context
                .client
                .create_budget_request(&new)
                .await
                .map_err(api_error)?;
            println!("{}", render::request_details(&created));
        }
        RequestsCommand::Update {
            id,
            title,
            amount,
            description,
            department,
            category,
            supplier,
        } => {
            let update = BudgetRequestUpdate {
                title,
                description,
                amount,
                department_id: department,
                supplier_id: supplier,
                expense_category_id: category,
            };
            if update.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            context.require_session().await?;
            let updated = context
                .client
                .update_budget_request(id, &update)
                .await
                .map_err(api_error)?;
            println!("{}", render::request_details(&updated));
        }
        RequestsCommand::Approve { id, review } => {
            review_request(context, id, ReviewDecision::Approve, review).await?;
        }
        RequestsCommand::Reject { id, review } => {
            review_request(context, id, ReviewDecision::Reject, review).await?;
        }
    }
    Ok(())
}

async fn review_request(
    context: &AppContext,
    id: BudgetRequestId,
    decision: ReviewDecision,
    review: ReviewArgs,
) -> Result<(), Report<CliError>> {
    context.require_admin().await?;
    let reviewed = context
        .client
        .review_budget_request(id, decision, review.comment.as_deref())
        .await
        .map_err(api_error)?;
    println!("{}", render::request_line(&reviewed));

    if !review.notify.is_empty() {
        let message = review_email(&reviewed.title, id, decision, review.comment, review.notify);
        context
            .client
            .send_email(&message)
            .await
            .map_err(api_error)?;
        println!("Notified {}.", message.to.join(", "));
    }
    Ok(())
}

fn review_email(
    title: &str,
    id: BudgetRequestId,
    decision: ReviewDecision,
    comment: Option<String>,
    to: Vec<String>,
) -> EmailMessage {
    let verdict = match decision {
        ReviewDecision::Approve => "approved",
        ReviewDecision::Reject => "rejected",
    };
    let mut body = format!("Budget request {id} \"{title}\" was {verdict}.");
    if let Some(comment) = comment {
        body.push_str("\n\n");
        body.push_str(&comment);
    }
    EmailMessage {
        to,
        subject: format!("Budget request {id} {verdict}"),
        body,
        budget_request_id: Some(id),
    }
}

async fn catalog(context: &AppContext, command: CatalogCommand) -> Result<(), Report<CliError>> {
    match command {
        CatalogCommand::List { kind } => {
            context.require_session().await?;
            let entries = context.client.list_catalog(kind).await.map_err(api_error)?;
            for entry in &entries {
                println!("{}", render::catalog_line(entry));
            }
        }
        CatalogCommand::Import { kind, file } => {
            let contents = tokio::fs::read(&file).await.map_err(|e| CliError::Io {
                path: file.display().to_string(),
                details: e.to_string(),
            })?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.csv", kind.name()));

            context.require_admin().await?;
            let summary = context
                .client
                .import_catalog_csv(kind, &file_name, contents)
                .await
                .map_err(api_error)?;
            println!("{}", render::import_summary(&summary));
        }
    }
    Ok(())
}
