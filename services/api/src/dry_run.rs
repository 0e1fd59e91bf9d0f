use crate::infra::InMemoryQueryStore;
use clap::Args;
use recruit_query::config::AppConfig;
use recruit_query::error::AppError;
use recruit_query::queries::{Criterion, DryRunSummary, HttpScoringSource, QueryService, TokenVerifier};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DryRunArgs {
    /// JSON file holding the criteria, either a bare list or `{"criteria": [...]}`
    #[arg(long)]
    pub(crate) criteria: PathBuf,
    /// Bearer token carrying the recruiter scope, forwarded to the scoring service
    #[arg(long)]
    pub(crate) token: String,
    /// Print the summary as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CriteriaFile {
    List(Vec<Criterion>),
    Wrapped { criteria: Vec<Criterion> },
}

impl CriteriaFile {
    fn into_criteria(self) -> Vec<Criterion> {
        match self {
            CriteriaFile::List(criteria) | CriteriaFile::Wrapped { criteria } => criteria,
        }
    }
}

fn load_criteria(path: &Path) -> Result<Vec<Criterion>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: CriteriaFile = serde_json::from_str(&raw)?;
    Ok(parsed.into_criteria())
}

pub(crate) async fn run_dry_run(args: DryRunArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let criteria = load_criteria(&args.criteria)?;
    let caller = TokenVerifier::new(&config.auth.jwt_secret).verify(&args.token)?;

    let scoring = Arc::new(HttpScoringSource::new(&config.scoring)?);
    let service = QueryService::new(Arc::new(InMemoryQueryStore::default()), scoring);
    let summary = service.dry_run(&caller, &criteria).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        render_summary(&summary, &config.scoring.base_url);
    }
    Ok(())
}

fn render_summary(summary: &DryRunSummary, scoring_url: &str) {
    println!("Dry run against {scoring_url}");
    println!("  Criteria evaluated: {}", summary.criteria);
    println!("  Distinct students matched: {}", summary.recipients);
}
