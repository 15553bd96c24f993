//! Result output formatting and writing.

use crate::config::OutputConfig;
use crate::orchestrator::FitReport;
use crate::OutputFormat;
use anyhow::{Context, Result};
use lib_csc::Codes;
use std::io::Write;
use std::path::Path;

/// Write job results to the output directory.
pub fn write_results(report: &FitReport, output_dir: &Path, format: OutputFormat, select: &OutputConfig) -> Result<()> {
    if select.codes {
        write_file(output_dir, "codes.csv", |f| write_codes(f, &report.fit.codes))?;
    }
    if select.reconstruction {
        write_file(output_dir, "reconstruction.csv", |f| write_reconstruction(f, report))?;
    }
    if select.events {
        write_file(output_dir, "events.csv", |f| write_events(f, report))?;
    }
    if select.objective {
        write_file(output_dir, "objective.csv", |f| write_objective(f, &report.fit.objective_history))?;
    }

    let summary_name = match format {
        OutputFormat::Text => "summary.txt",
        OutputFormat::Json => "summary.json",
        OutputFormat::Csv => "summary.csv",
    };
    write_file(output_dir, summary_name, |f| write_summary(f, report, format))?;

    Ok(())
}

fn write_file<F>(dir: &Path, name: &str, body: F) -> Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>) -> Result<()>,
{
    let path = dir.join(name);
    let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = std::io::BufWriter::new(file);
    body(&mut writer)?;
    writer.flush()?;
    tracing::info!("Wrote {:?}", path);
    Ok(())
}

/// One row per offset, one column per atom.
pub fn write_codes<W: Write>(w: &mut W, codes: &Codes) -> Result<()> {
    let header: Vec<String> = (0..codes.num_atoms()).map(|k| format!("atom_{}", k)).collect();
    writeln!(w, "offset,{}", header.join(","))?;

    let view = codes.view();
    for n in 0..codes.code_len() {
        let row: Vec<String> = view.column(n).iter().map(|v| v.to_string()).collect();
        writeln!(w, "{},{}", n, row.join(","))?;
    }
    Ok(())
}

pub fn write_reconstruction<W: Write>(w: &mut W, report: &FitReport) -> Result<()> {
    writeln!(w, "index,time_s,signal,reconstruction,residual")?;
    for (i, (&s, &r)) in report.signal.samples.iter().zip(&report.reconstruction).enumerate() {
        writeln!(w, "{},{},{},{},{}", i, report.signal.time_at(i).0, s, r, s - r)?;
    }
    Ok(())
}

pub fn write_events<W: Write>(w: &mut W, report: &FitReport) -> Result<()> {
    writeln!(w, "atom,offset,time_s,amplitude")?;
    for event in &report.events {
        writeln!(
            w,
            "{},{},{},{}",
            event.atom,
            event.offset,
            event.time(&report.signal).0,
            event.amplitude
        )?;
    }
    Ok(())
}

pub fn write_objective<W: Write>(w: &mut W, history: &[f64]) -> Result<()> {
    writeln!(w, "iteration,objective")?;
    for (i, v) in history.iter().enumerate() {
        writeln!(w, "{},{}", i, v)?;
    }
    Ok(())
}

pub fn write_summary<W: Write>(w: &mut W, report: &FitReport, format: OutputFormat) -> Result<()> {
    let fit = &report.fit;
    match format {
        OutputFormat::Text => {
            writeln!(w, "Sparse Coding Summary: {}", report.name)?;
            writeln!(w, "=======================")?;
            writeln!(w, "Signal:         {} samples", report.signal.len())?;
            writeln!(w, "Dictionary:     {} atoms x {}", report.dictionary.len(), report.dictionary.atom_len())?;
            writeln!(w, "Penalty:        {}", fit.penalty)?;
            writeln!(w, "Positive:       {}", fit.positive)?;
            writeln!(w, "Status:         {:?}", fit.status)?;
            writeln!(w, "Iterations:     {}", fit.iterations)?;
            writeln!(w, "Objective:      {:.6e}", fit.objective)?;
            writeln!(w, "Residual norm:  {:.6e}", fit.residual_norm)?;
            writeln!(w, "MSE:            {:.6e}", report.mse)?;
            writeln!(w, "Lipschitz:      {:.6}", report.lipschitz)?;
            writeln!(w, "Nonzero codes:  {}", fit.codes.count_nonzero(0.0))?;
            writeln!(w, "Sparsity:       {:.4}", fit.codes.sparsity())?;
            writeln!(w, "Events:         {}", report.events.len())?;
            writeln!(w, "Elapsed:        {:.3} ms", report.elapsed.as_secs_f64() * 1e3)?;
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "name": report.name,
                "signal_len": report.signal.len(),
                "num_atoms": report.dictionary.len(),
                "atom_len": report.dictionary.atom_len(),
                "penalty": fit.penalty,
                "positive": fit.positive,
                "status": fit.status,
                "iterations": fit.iterations,
                "objective": fit.objective,
                "residual_norm": fit.residual_norm,
                "mse": report.mse,
                "lipschitz": report.lipschitz,
                "nonzero": fit.codes.count_nonzero(0.0),
                "sparsity": fit.codes.sparsity(),
                "events": report.events,
                "elapsed_ms": report.elapsed.as_secs_f64() * 1e3,
            });
            writeln!(w, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(w, "metric,value")?;
            writeln!(w, "signal_len,{}", report.signal.len())?;
            writeln!(w, "num_atoms,{}", report.dictionary.len())?;
            writeln!(w, "atom_len,{}", report.dictionary.atom_len())?;
            writeln!(w, "penalty,{}", fit.penalty)?;
            writeln!(w, "positive,{}", fit.positive)?;
            writeln!(w, "status,{:?}", fit.status)?;
            writeln!(w, "iterations,{}", fit.iterations)?;
            writeln!(w, "objective,{}", fit.objective)?;
            writeln!(w, "residual_norm,{}", fit.residual_norm)?;
            writeln!(w, "mse,{}", report.mse)?;
            writeln!(w, "lipschitz,{}", report.lipschitz)?;
            writeln!(w, "nonzero,{}", fit.codes.count_nonzero(0.0))?;
            writeln!(w, "events,{}", report.events.len())?;
        }
    }
    Ok(())
}

/// Print a short summary to stdout.
pub fn print_results(report: &FitReport) {
    println!("\n=== Sparse Coding Results ===\n");
    println!("  Status:      {:?} after {} iterations", report.fit.status, report.fit.iterations);
    println!("  Objective:   {:.6e}", report.fit.objective);
    println!("  MSE:         {:.6e}", report.mse);
    println!("  Nonzero:     {}", report.fit.codes.count_nonzero(0.0));

    if !report.events.is_empty() {
        println!("\n  Events:");
        for event in report.events.iter().take(20) {
            println!(
                "    atom {:3}  offset {:7}  t = {:.4} s  amp {:.4}",
                event.atom,
                event.offset,
                event.time(&report.signal).0,
                event.amplitude
            );
        }
        if report.events.len() > 20 {
            println!("    ... {} more", report.events.len() - 20);
        }
    }
    println!();
}
