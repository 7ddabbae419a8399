//! Travel-time front-end: velocity grid in, time grid out.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hypogrid::authoring::*;

#[derive(Parser, Debug)]
#[command(
    name = "tt",
    about = "Compute a first-arrival travel-time grid from a velocity model",
    version
)]
struct Cli {
    /// Velocity model grid root (reads <model>.hdr and <model>.buf)
    model: String,

    /// Output root (writes <output>.time.{hdr,buf}, <output>.mod.{hdr,buf}
    /// and <output>.prof)
    output: String,

    /// Source as "LABEL lat lon depth" (degrees, km)
    #[arg(long)]
    source: String,

    /// Geographic anchor of the grid origin as "lat lon"; defaults to the
    /// source position
    #[arg(long)]
    origin: Option<String>,

    /// Byte-swap the model grid on read
    #[arg(long)]
    swap: bool,

    /// Half-width of the init cube around the source
    #[arg(long, default_value_t = 2)]
    ncube: usize,

    /// Budget of head-wave reverse sweeps
    #[arg(long, default_value_t = 10)]
    max_restarts: usize,

    /// Cap the expansion radius (cells) for offset-limited runs
    #[arg(long)]
    max_radius: Option<usize>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,
}

fn parse_source(spec: &str) -> Result<SrcLoc> {
    let fields: Vec<&str> = spec.split_whitespace().collect();
    if fields.len() != 4 {
        bail!("source must be given as \"LABEL lat lon depth\", got '{spec}'");
    }
    Ok(SrcLoc::new(
        fields[0],
        fields[1].parse().context("malformed source latitude")?,
        fields[2].parse().context("malformed source longitude")?,
        fields[3].parse().context("malformed source depth")?,
    ))
}

fn parse_origin(spec: &str) -> Result<(f64, f64)> {
    let fields: Vec<&str> = spec.split_whitespace().collect();
    if fields.len() != 2 {
        bail!("origin must be given as \"lat lon\", got '{spec}'");
    }
    Ok((
        fields[0].parse().context("malformed origin latitude")?,
        fields[1].parse().context("malformed origin longitude")?,
    ))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    let source = parse_source(&cli.source)?;
    let (lat0, lon0) = match &cli.origin {
        Some(spec) => parse_origin(spec)?,
        None => (source.lat, source.lon),
    };

    let swap = if cli.swap {
        SwapMode::SwapIn
    } else {
        SwapMode::Native
    };
    let model = Grid3::read_with(&cli.model, swap)
        .with_context(|| format!("reading velocity model '{}'", cli.model))?;
    info!(
        "model '{}': {} x {} x {} {} nodes",
        cli.model,
        model.hdr.nx,
        model.hdr.ny,
        model.hdr.nz,
        model.hdr.kind.tag()
    );

    let frame = SphericalFrame::new(lat0, lon0, model.hdr.origz, model.hdr.dz);
    let cfg = SolverConfig {
        ncube: cli.ncube,
        max_restarts: cli.max_restarts,
        max_radius: cli.max_radius,
        ..Default::default()
    };

    let (times, stats) = travel_time_with_stats(&model, &frame, &source, &cfg)
        .with_context(|| format!("solving travel times for source '{}'", source.label))?;
    if !stats.converged {
        warn!(
            "solver left head waves unresolved after {} restarts",
            stats.restarts
        );
    }

    let time_root = format!("{}.time", cli.output);
    times
        .write(&time_root)
        .with_context(|| format!("writing time grid '{time_root}'"))?;

    let model_root = format!("{}.mod", cli.output);
    model
        .write(&model_root)
        .with_context(|| format!("writing model grid '{model_root}'"))?;

    write_profile(&cli.output, &model, &times, &frame, &source)?;

    info!(
        "wrote '{time_root}' ({} restarts, head waves {:?})",
        stats.restarts, stats.head_waves
    );
    Ok(())
}

/// The 1D velocity/time profile directly under the source
fn write_profile(
    output: &str,
    model: &Grid3,
    times: &Grid3,
    frame: &SphericalFrame,
    source: &SrcLoc,
) -> Result<()> {
    use std::io::Write;

    let path = format!("{output}.prof");
    let mut file = std::fs::File::create(&path).with_context(|| format!("creating '{path}'"))?;

    let (fxs, fys, _) = frame.grid_coords(source.lat, source.lon, source.depth);
    let ix = (fxs.round() as usize).min(model.hdr.nx - 1);
    let iy = (fys.round() as usize).min(model.hdr.ny - 1);

    writeln!(file, "# depth_km velocity_km_s time_s")?;
    for iz in 0..model.hdr.nz {
        let depth = model.hdr.origz + iz as f64 * model.hdr.dz;
        let vel = model
            .hdr
            .kind
            .velocity_from(model.value_at(ix, iy, iz) as f64, model.hdr.dx)
            .unwrap_or(f64::NAN);
        let t = times.value_at(ix, iy, iz);
        writeln!(file, "{depth:.3} {vel:.6} {t:.6}")?;
    }
    Ok(())
}
