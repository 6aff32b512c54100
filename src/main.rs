use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use fairsim::analysis::{GroupImpact, SimulationSummary};
use fairsim::baseline::BaselineMetrics;
use fairsim::config::{SimulationConfig, ranges};
use fairsim::gemini::GeminiClient;
use fairsim::insight::{self, InsightService, Insights};
use fairsim::policy::PolicySettings;
use fairsim::population;
use fairsim::session::Session;
use fairsim::types::GroupKind;

const USAGE: &str = "usage: fairsim --population <file> [--policy <file.json>] [--config <file.json>] \
[--trials N] [--chunk N] [--seed S] [--output <summary.json>] [--csv <trials.csv>] [--insights] [--quiet]";

#[derive(Serialize)]
struct Report<'a> {
    baseline: &'a BaselineMetrics,
    summary: &'a SimulationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    insights: Option<&'a Insights>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let mut population_path: Option<String> = None;
    let mut policy_path: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut trials_override: Option<usize> = None;
    let mut chunk_override: Option<usize> = None;
    let mut seed_override: Option<u64> = None;
    let mut output_path: Option<String> = None;
    let mut csv_path: Option<String> = None;
    let mut want_insights = false;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String> {
            i += 1;
            args.get(i).cloned().with_context(|| format!("{flag} requires a value\n{USAGE}"))
        };
        match flag {
            "--population" => population_path = Some(value()?),
            "--policy" => policy_path = Some(value()?),
            "--config" => config_path = Some(value()?),
            "--trials" => {
                trials_override = Some(value()?.parse().context("--trials requires a positive integer")?)
            }
            "--chunk" => {
                chunk_override = Some(value()?.parse().context("--chunk requires a positive integer")?)
            }
            "--seed" => seed_override = Some(value()?.parse().context("--seed requires a u64")?),
            "--output" => output_path = Some(value()?),
            "--csv" => csv_path = Some(value()?),
            "--insights" => want_insights = true,
            "--quiet" => quiet = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return Ok(());
            }
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(p) => SimulationConfig::from_json_file(p).with_context(|| format!("reading {p}"))?,
        None => SimulationConfig::canonical(),
    };
    if let Some(p) = &policy_path {
        config.policy = PolicySettings::from_json_file(p).with_context(|| format!("reading {p}"))?;
    }
    if let Some(n) = trials_override {
        config.trials = n;
    }
    if let Some(n) = chunk_override {
        config.chunk_size = n;
    }
    if seed_override.is_some() {
        config.seed = seed_override;
    }

    let out_of_range = config.policy.check_ranges();
    if !out_of_range.is_empty() {
        let names: Vec<String> = out_of_range.iter().map(|(n, v)| format!("{n}={v}")).collect();
        bail!("policy levers outside their documented ranges: {}", names.join(", "));
    }
    if !ranges::TRIALS.contains(&config.trials) {
        log::warn!(
            "{} trials is outside the usual {}..={} range",
            config.trials,
            ranges::TRIALS.start(),
            ranges::TRIALS.end()
        );
    }

    let population_path = population_path.with_context(|| format!("--population is required\n{USAGE}"))?;
    let people = population::load(&population_path)
        .with_context(|| format!("loading population from {population_path}"))?;

    let mut session = Session::new();
    let baseline = session.load_population(people)?;

    let mut sim = session.start_run(&config)?;
    let show_progress = !quiet && std::io::stderr().is_terminal();
    for progress in sim.batches() {
        let p = progress?;
        if show_progress {
            eprint!("\rSimulating... {:>3.0}% ({}/{})", p.percent(), p.completed, p.total);
        }
    }
    if show_progress {
        eprintln!();
    }
    let summary = sim.run()?;
    let summary = session.publish(summary)?;

    let insights = if want_insights {
        let client = match GeminiClient::from_env() {
            Ok(c) => Some(c),
            Err(e) => {
                log::info!("remote insights disabled ({e}); using local summaries");
                None
            }
        };
        let service = client.as_ref().map(|c| c as &dyn InsightService);
        Some(insight::summarize_all(service, &summary, &baseline, &config.policy))
    } else {
        None
    };

    if let Some(path) = &output_path {
        let file = File::create(path).with_context(|| format!("creating {path}"))?;
        let mut writer = BufWriter::new(file);
        let report = Report { baseline: &baseline, summary: &summary, insights: insights.as_ref() };
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
    }
    if let Some(path) = &csv_path {
        write_trials_csv(&summary, path)?;
    }

    if !quiet {
        print_baseline(&baseline);
        print_summary(&summary);
        for kind in GroupKind::ALL {
            print_equity(kind, summary.equity.for_kind(kind));
        }
        if let Some(ins) = &insights {
            println!("\n=== Insights ===");
            println!("\n--- Policy ---\n{}", ins.policy.trim());
            println!("\n--- Equity ---\n{}", ins.equity.trim());
            println!("\n--- Environmental ---\n{}", ins.environmental.trim());
        }
    }
    Ok(())
}

fn print_baseline(b: &BaselineMetrics) {
    println!("\n=== Baseline ({} people) ===", b.population);
    println!("  Mean income:            {:>12.0}", b.mean_income);
    println!("  Median income:          {:>12.0}", b.median_income);
    println!("  Mean disposable income: {:>12.0}", b.mean_disposable_income);
    println!("  Gini:                   {:>12.3}", b.gini);
    println!("  Employment rate:        {:>11.1}%", b.employment_rate * 100.0);
    println!("  Poverty rate:           {:>11.1}%", b.poverty_rate * 100.0);
    println!("  Mean rent:              {:>12.0}", b.mean_rent);
    println!("  Mean rent burden:       {:>11.1}%", b.mean_rent_burden * 100.0);
    println!("  Vehicle ownership:      {:>11.1}%", b.vehicle_ownership_rate * 100.0);
    println!("  CO2 per capita (kg):    {:>12.0}", b.co2_per_capita);
    println!("  Total CO2 (t):          {:>12.1}", b.total_co2_emissions / 1_000.0);
    println!("  Mean energy (kWh/mo):   {:>12.0}", b.mean_energy_use);

    let modes: Vec<String> =
        b.commute_mode_distribution.iter().map(|(m, n)| format!("{m}={n}")).collect();
    println!("  Commute modes:          {}", modes.join(", "));
    let brackets: Vec<String> =
        b.income_bracket_distribution.iter().map(|(br, n)| format!("{br}={n}")).collect();
    println!("  Income brackets:        {}", brackets.join(", "));
}

fn print_summary(s: &SimulationSummary) {
    println!("\n=== Monte Carlo Summary (N={} trials, seed {}) ===", s.trials.len(), s.seed);
    println!(
        "{:>18} | {:>12} | {:>12} | {:>12} | {:>10}",
        "Metric", "mean", "ci95_lo", "ci95_hi", "stddev"
    );
    println!("{}", "-".repeat(18 + 3 + 12 + 3 + 12 + 3 + 12 + 3 + 10));
    for (name, m) in s.summary.rows() {
        println!(
            "{:>18} | {:>12.4} | {:>12.4} | {:>12.4} | {:>10.4}",
            name, m.mean, m.ci95_lower, m.ci95_upper, m.std_dev
        );
    }
}

fn print_equity(kind: GroupKind, groups: &[GroupImpact]) {
    println!("\n--- Equity by {kind} ---");
    println!("{:>24} | {:>12} | {:>12} | {:>8}", "Group", "Δ income", "Baseline", "Δ%");
    for g in groups {
        println!(
            "{:>24} | {:>12.0} | {:>12.0} | {:>7.2}%",
            g.group, g.mean_income_change, g.baseline_income, g.percent_change
        );
    }
}

fn write_trials_csv(summary: &SimulationSummary, path: &str) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {path}"))?;
    let mut w = BufWriter::new(file);
    writeln!(
        w,
        "trial,seed,mean_income,mean_disposable_income,gini,employment_rate,mean_rent,mean_rent_paid,mean_rent_burden,mean_emissions,mean_energy_use"
    )?;
    for t in &summary.trials {
        writeln!(
            w,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            t.trial,
            summary.seed.wrapping_add(t.trial as u64),
            t.mean_income,
            t.mean_disposable_income,
            t.gini,
            t.employment_rate,
            t.mean_rent,
            t.mean_rent_paid,
            t.mean_rent_burden,
            t.mean_emissions,
            t.mean_energy_use,
        )?;
    }
    Ok(())
}
