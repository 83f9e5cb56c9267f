//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::commands::{estimate, history, knowledge};
use crate::context::AppContext;
use crate::estimator::{CalculationRequest, Complexity, MaterialType, RoofType};
use crate::history::Feedback;
use crate::knowledge::KnowledgeItem;
use crate::orchestrator::Strategy;

#[derive(Parser, Debug)]
#[command(name = "roofmate", version, about = "Roof material and cost estimation")]
pub struct Cli {
    /// Config file (default: <config_dir>/roofmate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User the calculations are recorded for
    #[arg(long, global = true, env = "ROOFMATE_USER", default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Estimate materials and cost for a roof
    Estimate {
        /// Length in feet
        #[arg(long)]
        length: f64,

        /// Width in feet
        #[arg(long)]
        width: f64,

        /// Roofing material (shingles, metal_sheets, tiles, membrane, polycarbonate)
        #[arg(long)]
        material: String,

        #[arg(long, default_value = "gable")]
        roof_type: String,

        /// Rise per 12 run; 0 when unknown
        #[arg(long, default_value_t = 0.0)]
        slope: f64,

        #[arg(long, default_value = "simple")]
        complexity: String,

        #[arg(long)]
        location: Option<String>,

        /// advisory_only, deterministic_only or blended (also: ai, ml, hybrid)
        #[arg(long, default_value = "blended")]
        method: String,
    },

    /// Browse recorded calculations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Rate a recorded calculation
    Feedback {
        calculation_id: i64,

        /// 1 (poor) to 5 (excellent)
        #[arg(long)]
        rating: i64,

        #[arg(long)]
        comments: Option<String>,

        /// What the job actually cost
        #[arg(long)]
        actual_cost: Option<f64>,
    },

    /// Calculation activity over the last 30 days
    Stats,

    /// Search and edit the knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HistoryAction {
    /// List calculations, newest first
    List {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one calculation
    Show { id: i64 },
}

#[derive(Subcommand, Debug, Clone)]
pub enum KnowledgeAction {
    /// Free-text search
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Entries in a category, most used first
    List {
        category: String,

        #[arg(long)]
        material: Option<String>,
    },

    /// Add or update an entry
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        category: String,

        /// Material key, or "general"
        #[arg(long, default_value = "general")]
        material: String,

        #[arg(long)]
        content: String,
    },
}

impl Command {
    /// Build the estimation request for an `estimate` invocation.
    pub fn calculation_request(&self) -> Option<CalculationRequest> {
        match self {
            Command::Estimate {
                length,
                width,
                material,
                roof_type,
                slope,
                complexity,
                location,
                ..
            } => {
                let mut request = CalculationRequest::new(
                    *length,
                    *width,
                    RoofType::from_str(roof_type),
                    MaterialType::from_str(material),
                )
                .with_slope(*slope)
                .with_complexity(Complexity::from_str(complexity));
                if let Some(location) = location {
                    request = request.with_location(location.as_str());
                }
                Some(request)
            }
            _ => None,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Execute one command and return its JSON output.
pub async fn execute(ctx: &AppContext, user: &str, command: Command) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::Estimate { ref method, .. } => {
            let strategy = Strategy::from_str(method)?;
            let request = command
                .calculation_request()
                .ok_or_else(|| anyhow::anyhow!("not an estimate command"))?;
            to_json(&estimate::run_estimate(ctx, user, request, strategy).await?)
        }
        Command::History { action } => match action {
            HistoryAction::List { limit } => to_json(&history::list_history(ctx, user, limit).await?),
            HistoryAction::Show { id } => to_json(&history::get_calculation(ctx, id).await?),
        },
        Command::Feedback {
            calculation_id,
            rating,
            comments,
            actual_cost,
        } => {
            let feedback = Feedback {
                rating,
                comments,
                actual_cost,
            };
            let feedback_id = history::submit_feedback(ctx, calculation_id, feedback).await?;
            Ok(serde_json::json!({
                "feedback_id": feedback_id,
                "calculation_id": calculation_id,
            }))
        }
        Command::Stats => to_json(&history::calculation_stats(ctx).await?),
        Command::Knowledge { action } => match action {
            KnowledgeAction::Search { query, limit } => {
                to_json(&knowledge::search_knowledge(ctx, &query, limit))
            }
            KnowledgeAction::List { category, material } => {
                to_json(&knowledge::list_knowledge(ctx, &category, material.as_deref()).await?)
            }
            KnowledgeAction::Add {
                id,
                category,
                material,
                content,
            } => {
                let count = knowledge::upsert_knowledge(
                    ctx,
                    KnowledgeItem {
                        id,
                        content,
                        category,
                        material,
                    },
                )
                .await?;
                Ok(serde_json::json!({ "entries": count }))
            }
        },
    }
}
