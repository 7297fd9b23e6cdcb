use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{OffLevel, Verbosity};
use fieldbill_billing::config::BillingConfig;
use fieldbill_billing::domain::{
    aggregate, amortization_schedule, price_breakdown, total_interest, DocumentKind,
    FinanceAgreement, InvoiceTotals, LineItem, LineItemBuilder, ScheduleEntry, SequenceAllocator,
    WorkUnit,
};
use fieldbill_common::{logging, CompanyId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(name = "fieldbill")]
#[command(about = "Fieldbill - rental pricing, invoicing and financing calculations")]
struct Args {
    #[arg(short, long, global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: Verbosity<OffLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration as TOML
    GenConfig,

    /// Price a rental period against a named rate table
    Price {
        #[arg(long)]
        table: String,

        #[arg(long)]
        days: u32,
    },

    /// Build line items and totals for a rental or service job
    ///
    /// The quote number is drawn from the Postgres sequence store when built
    /// with the `postgres` feature; otherwise it is a placeholder that starts
    /// at 0001 on every run.
    Quote {
        #[arg(long)]
        table: String,

        #[arg(long, help = "Start date (YYYY-MM-DD)")]
        start: NaiveDate,

        #[arg(long, help = "End date (YYYY-MM-DD)")]
        end: NaiveDate,

        #[arg(long, default_value = "default")]
        company: String,

        #[arg(long, help = "Equipment reference; defaults to the table name")]
        equipment: Option<String>,

        #[arg(long, help = "Service description")]
        service: Option<String>,

        #[arg(long, help = "Estimated service cost")]
        estimate: Option<Decimal>,

        #[arg(long, default_value = "0", help = "Invoice-level discount amount")]
        discount: Decimal,

        #[arg(long, help = "Tax rate percent; defaults to the configured rate")]
        tax: Option<Decimal>,
    },

    /// Compute a fixed monthly payment for a financed purchase
    Amortize {
        #[arg(long)]
        principal: Decimal,

        #[arg(long, help = "Annual interest rate percent")]
        rate: Decimal,

        #[arg(long, help = "Term in months")]
        term: u32,

        #[arg(long, default_value = "0")]
        down_payment: Decimal,

        #[arg(long, help = "Agreement start date (YYYY-MM-DD); defaults to today")]
        start: Option<NaiveDate>,

        #[arg(long, help = "Include the per-period schedule")]
        schedule: bool,
    },
}

#[derive(Serialize)]
struct QuoteOutput {
    quote_number: String,
    /// False when numbers come from a per-run counter and are placeholders.
    quote_number_durable: bool,
    duration_days: u32,
    lines: Vec<LineItem>,
    totals: InvoiceTotals,
}

#[derive(Serialize)]
struct AmortizeOutput {
    principal: Decimal,
    monthly_payment: Decimal,
    total_interest: Decimal,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<Vec<ScheduleEntry>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_cli_logging(&args.verbosity, "fieldbill_billing=info,fieldbill::audit=info")?;

    let config_path = args.config;
    let output = match args.command {
        Command::GenConfig => BillingConfig::generate_example()?,
        Command::Price { table, days } => {
            let config = load_config(config_path.as_deref())?;
            let table = config.rate_tables.get(&table)?;
            serde_json::to_string_pretty(&price_breakdown(days, table)?)?
        }
        Command::Quote {
            table,
            start,
            end,
            company,
            equipment,
            service,
            estimate,
            discount,
            tax,
        } => {
            let config = load_config(config_path.as_deref())?;
            let rate_table = config.rate_tables.effective(&table, start)?;
            let company_id = CompanyId::new(company)?;

            let mut work_unit = WorkUnit::rental(equipment.unwrap_or(table), start, end);
            if service.is_some() || estimate.is_some() {
                work_unit = work_unit.with_service(
                    service.unwrap_or_else(|| "Service".to_string()),
                    estimate.unwrap_or(Decimal::ZERO),
                );
            }

            let lines = LineItemBuilder::new(config.build_options())
                .build_lines(&work_unit, rate_table)?;
            let totals = aggregate(
                &lines,
                discount,
                tax.unwrap_or(config.invoicing.default_tax_rate_pct),
            )?;

            let allocator = SequenceAllocator::from_config(&config).await?;
            let quote_number = allocator
                .next_document_number(&company_id, DocumentKind::Quote, Utc::now().date_naive())
                .await?;

            serde_json::to_string_pretty(&QuoteOutput {
                quote_number: quote_number.to_string(),
                quote_number_durable: SequenceAllocator::is_durable(),
                duration_days: work_unit.duration_days(),
                lines,
                totals,
            })?
        }
        Command::Amortize {
            principal,
            rate,
            term,
            down_payment,
            start,
            schedule,
        } => {
            let start_date = start.unwrap_or_else(|| Utc::now().date_naive());
            let agreement = FinanceAgreement::new(principal, down_payment, rate, term, start_date)?;
            let schedule = if schedule {
                Some(amortization_schedule(&agreement)?)
            } else {
                None
            };

            serde_json::to_string_pretty(&AmortizeOutput {
                principal: agreement.principal(),
                monthly_payment: agreement.monthly_payment,
                total_interest: total_interest(&agreement),
                start_date: agreement.start_date,
                end_date: agreement.end_date,
                schedule,
            })?
        }
    };

    println!("{}", output);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BillingConfig> {
    let config = BillingConfig::load(path).context("loading configuration")?;
    debug!(
        tables = config.rate_tables.names().count(),
        "Configuration loaded"
    );
    Ok(config)
}
