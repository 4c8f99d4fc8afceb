//! Developer CLI for exercising the engine against the built-in catalogue (§10.3). Not the
//! excluded UI shell — a thin wrapper the host UI's backend would otherwise provide.

use clap::{Parser, Subcommand};
use echo_policy_engine::cost::CostWeights;
use echo_policy_engine::query::{bootstrap, Engine, PolicyRequest};
use echo_policy_engine::reroll::{BuffPick, RerollRequest};
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(name = "echo-policy", about = "Artifact enhancement policy solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve for the given target score under uniform buff weights and print the summary.
    Solve {
        #[arg(long, default_value_t = 60.0)]
        target: f64,
        #[arg(long, default_value = "linear")]
        scorer: String,
    },
    /// Rank lock-sets for a reroll decision between a baseline and an optional candidate.
    Reroll {
        #[arg(long, default_value_t = 60.0)]
        target: f64,
        /// `buff:value` pairs, exactly 5.
        #[arg(long = "baseline", num_args = 5)]
        baseline: Vec<String>,
        /// `buff:value` pairs, 0 or 5.
        #[arg(long = "candidate", num_args = 0..=5)]
        candidate: Vec<String>,
    },
}

fn parse_pick(raw: &str) -> BuffPick {
    let (buff, value) = raw.split_once(':').unwrap_or_else(|| panic!("expected `buff:value`, got `{raw}`"));
    BuffPick {
        buff: buff.to_string(),
        value: value.parse().unwrap_or_else(|_| panic!("expected an integer value, got `{value}`")),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let engine = Engine::new();
    let cancel = AtomicBool::new(false);

    match cli.command {
        Command::Solve { target, scorer } => {
            let info = bootstrap();
            let request = PolicyRequest {
                buff_weights: info.default_buff_weights,
                target_score: target,
                scorer_type: scorer,
                cost_weights: CostWeights {
                    w_echo: 1.0,
                    w_tuner: 1.0,
                    w_exp: 0.01,
                },
                exp_refund_ratio: info.default_exp_refund_ratio,
                blend_user_data: None,
                lambda_tolerance: None,
                lambda_max_iter: None,
            };
            match engine.compute_policy(&request, &cancel) {
                Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary).expect("summary always serialises")),
                Err(err) => eprintln!("error: {err}"),
            }
        }
        Command::Reroll { target, baseline, candidate } => {
            let info = bootstrap();
            let request = PolicyRequest {
                buff_weights: info.default_buff_weights,
                target_score: target,
                scorer_type: info.default_scorer_type,
                cost_weights: info.default_cost_weights,
                exp_refund_ratio: info.default_exp_refund_ratio,
                blend_user_data: None,
                lambda_tolerance: None,
                lambda_max_iter: None,
            };
            if let Err(err) = engine.compute_reroll_policy(&request, &cancel) {
                eprintln!("error: {err}");
                return;
            }
            let reroll_request = RerollRequest {
                baseline_buffs: baseline.iter().map(|s| parse_pick(s)).collect(),
                candidate_buffs: candidate.iter().map(|s| parse_pick(s)).collect(),
                top_k: 5,
            };
            match engine.query_reroll_recommendation(&reroll_request, &cancel) {
                Ok(recommendation) => {
                    println!("{}", serde_json::to_string_pretty(&recommendation).expect("recommendation always serialises"))
                }
                Err(err) => eprintln!("error: {err}"),
            }
        }
    }
}
