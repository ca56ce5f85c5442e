use anyhow::{bail, Context};
use choice_fit::app::output::{format_number, render_delimited};
use choice_fit::app::trial_csv::parse_trials;
use choice_fit::config::utility_from_omega;
use choice_fit::core::landscape::{default_axis, likelihood_landscape};
use choice_fit::domain::model::{ModelKind, TaskData};
use choice_fit::utils::logger;
use choice_fit::utils::validation::validate_range;
use clap::Parser;

#[derive(Parser)]
#[command(name = "likelihood-landscape")]
#[command(about = "Evaluate one participant's log-likelihood over an (alpha, beta) grid")]
struct Args {
    /// Trial-level CSV in the same layout choice-fit reads
    #[arg(short, long)]
    input: String,

    /// Participant to evaluate (defaults to the first one in the file)
    #[arg(short, long)]
    participant: Option<String>,

    #[arg(short, long, default_value = "landscape.csv")]
    output: String,

    #[arg(long, default_value = "0.5")]
    starting_prob: f64,

    /// Use the additive utility with this magnitude weight
    #[arg(long)]
    omega: Option<f64>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_logger(args.verbose);

    validate_range("starting_prob", args.starting_prob, 0.0, 1.0)?;
    if let Some(omega) = args.omega {
        validate_range("omega", omega, 0.0, 1.0)?;
    }

    let bytes = std::fs::read(&args.input).with_context(|| format!("reading {}", args.input))?;
    let participants = parse_trials(&bytes, ModelKind::SameAlpha)?;

    let participant = match &args.participant {
        Some(id) => participants
            .iter()
            .find(|p| &p.id == id)
            .with_context(|| format!("participant {} not found in {}", id, args.input))?,
        None => participants.first().context("no participants in input")?,
    };
    let TaskData::Single(block) = &participant.data else {
        bail!("participant {} has split blocks", participant.id);
    };

    let axis = default_axis();
    tracing::info!(
        "🗺️ Evaluating {} x {} grid for participant {} ({} trials)",
        axis.len(),
        axis.len(),
        participant.id,
        block.len()
    );

    let landscape = likelihood_landscape(
        block,
        &axis,
        &axis,
        utility_from_omega(args.omega),
        args.starting_prob,
    )?;

    let header: Vec<String> = ["alpha", "beta", "log_likelihood", "normalised_likelihood"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows: Vec<Vec<String>> = landscape
        .cells()
        .map(|(alpha, beta, ll, nl)| {
            vec![
                format_number(alpha),
                format_number(beta),
                format_number(ll),
                format!("{:e}", nl),
            ]
        })
        .collect();

    let data = render_delimited(&header, &rows, b',')?;
    std::fs::write(&args.output, data).with_context(|| format!("writing {}", args.output))?;

    match landscape.argmax() {
        Some(peak) => {
            tracing::info!(
                "📈 Peak at alpha={:.3} beta={:.3} (log-likelihood {:.4})",
                peak.alpha,
                peak.beta,
                peak.log_likelihood
            );
            println!(
                "📈 Peak: alpha={:.3} beta={:.3} log_likelihood={:.4}",
                peak.alpha, peak.beta, peak.log_likelihood
            );
        }
        None => tracing::warn!("⚠️ No finite log-likelihood on the grid"),
    }
    println!("📁 Landscape saved to: {}", args.output);

    Ok(())
}
