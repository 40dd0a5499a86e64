use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use rusty_scatter::chart::builder::DEFAULT_TOP_N;
use rusty_scatter::data::filter::DEFAULT_THRESHOLD;
use rusty_scatter::{
    build_heatmap, build_top_correlations, load, profile_column, summarize, ChartDescription,
    ColumnSelection, DatasetStore, ImageFormat, PlotMode, RenderConfig, Renderer, ScatterRequest,
    SeriesOptions,
};

/// Load CSV or Excel data and render scatter charts and correlation plots
#[derive(Parser, Debug)]
#[command(name = "rusty-scatter", version)]
struct Args {
    /// Browser executable used for PNG/JPEG output
    #[arg(long, global = true, value_name = "PATH")]
    browser: Option<PathBuf>,

    /// Directory the browser engine is installed into when missing
    #[arg(long, global = true, value_name = "DIR")]
    browser_dir: Option<PathBuf>,

    /// Seconds before a render is abandoned
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Shape, column kinds, missing values and the first rows
    Summary {
        /// CSV, Excel, or base64 text file ("-" for stdin)
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Statistics for one column
    Info {
        input: PathBuf,
        #[arg(short, long)]
        column: String,
        #[arg(long)]
        json: bool,
    },
    /// Dual-axis scatter chart
    Scatter {
        input: PathBuf,
        #[arg(short, long)]
        x: String,
        /// Comma-separated primary y columns
        #[arg(short, long, value_delimiter = ',', required = true)]
        y: Vec<String>,
        /// Comma-separated secondary y columns
        #[arg(long, value_delimiter = ',')]
        y2: Vec<String>,
        /// Parse this column as dates and draw lines between points
        #[arg(long)]
        date_column: Option<String>,
        #[arg(long)]
        remove_outliers: bool,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Decimate points per pixel column (tens of thousands of rows)
        #[arg(long)]
        large_data: bool,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Pearson correlation heatmap
    Heatmap {
        input: PathBuf,
        /// Comma-separated numeric columns (default: all numeric)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// One panel per column most correlated with a target
    TopCorrelations {
        input: PathBuf,
        #[arg(short, long)]
        x: String,
        #[arg(short, long)]
        target: String,
        #[arg(short, long, default_value_t = DEFAULT_TOP_N)]
        n: usize,
        #[arg(long, value_enum, default_value = "markers")]
        mode: ModeArg,
        #[arg(long)]
        large_data: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    #[arg(long, value_enum, default_value = "png")]
    format: FormatArg,

    /// Output file (scatter, heatmap) or directory (top-correlations)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the chart description as JSON instead of rendering
    #[arg(long)]
    describe: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
    Svg,
}

impl From<FormatArg> for ImageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
            FormatArg::Svg => ImageFormat::Svg,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Markers,
    #[value(name = "lines+markers")]
    LinesMarkers,
}

impl From<ModeArg> for PlotMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Markers => PlotMode::Markers,
            ModeArg::LinesMarkers => PlotMode::LinesAndMarkers,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = RenderConfig::from_env();
    if let Some(browser) = args.browser {
        config.browser = Some(browser);
    }
    if let Some(dir) = args.browser_dir {
        config.browser_dir = dir;
    }
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    let renderer = Renderer::from_config(&config);
    let store = DatasetStore::new();

    match args.command {
        Cmd::Summary { input, json } => {
            let table = store.get(&register(&store, &input)?)?;
            let summary = summarize(&table);
            if json {
                print_json(&summary)?;
            } else {
                println!("Rows: {}  Columns: {}", summary.rows, summary.columns);
                for ((name, kind), missing) in summary
                    .column_names
                    .iter()
                    .zip(&summary.column_kinds)
                    .zip(&summary.missing_values)
                {
                    println!("  {name:<24} {:<9} missing: {missing}", kind.name());
                }
                println!("First {} rows:", summary.preview.len());
                for row in &summary.preview {
                    let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                    println!("  {}", cells.join(", "));
                }
            }
        }

        Cmd::Info {
            input,
            column,
            json,
        } => {
            let table = store.get(&register(&store, &input)?)?;
            let profile = profile_column(&table, &column)?;
            if json {
                print_json(&profile)?;
            } else {
                println!("Column: {} ({})", profile.name, profile.kind.name());
                println!(
                    "Values: {} of {} ({} missing)",
                    profile.non_missing, profile.total, profile.missing
                );
                if let Some(stats) = &profile.numeric {
                    println!("Mean: {:.4}  Median: {:.4}", stats.mean, stats.median);
                    match stats.std {
                        Some(std) => println!("Std: {std:.4}"),
                        None => println!("Std: n/a"),
                    }
                    println!("Min: {}  Max: {}", stats.min, stats.max);
                }
                if let Some(distinct) = &profile.distinct {
                    println!("Distinct values: {}", distinct.count);
                    if let Some(values) = &distinct.values {
                        let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                        println!("  {}", values.join(", "));
                    }
                }
                let sample: Vec<String> = profile.sample.iter().map(ToString::to_string).collect();
                println!("Sample: {}", sample.join(", "));
            }
        }

        Cmd::Scatter {
            input,
            x,
            y,
            y2,
            date_column,
            remove_outliers,
            threshold,
            large_data,
            title,
            output,
        } => {
            let name = register(&store, &input)?;
            let request = ScatterRequest {
                selection: ColumnSelection::new(x, y).with_secondary(y2),
                date_column,
                outlier_threshold: remove_outliers.then_some(threshold),
                large_data,
                title,
                format: output.format.into(),
            };
            if output.describe {
                let table = store.get(&name)?;
                let (chart, report) = request.prepare(&table)?;
                log::info!("{report}");
                return print_json(&chart);
            }
            let result = request
                .run_stored(&store, &name, &renderer)
                .context("Failed to create scatter chart")?;
            let path = output
                .output
                .unwrap_or_else(|| default_output(&input, "scatter", result.format));
            fs::write(&path, &result.image)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", result.report);
            println!("Wrote {}", path.display());
        }

        Cmd::Heatmap {
            input,
            columns,
            title,
            output,
        } => {
            let table = store.get(&register(&store, &input)?)?;
            let columns = (!columns.is_empty()).then_some(columns.as_slice());
            let chart = build_heatmap(&table, columns, title.as_deref())?;
            if output.describe {
                return print_json(&chart);
            }
            let format = output.format.into();
            let path = output
                .output
                .unwrap_or_else(|| default_output(&input, "heatmap", format));
            write_chart(&renderer, &chart, format, &path)?;
        }

        Cmd::TopCorrelations {
            input,
            x,
            target,
            n,
            mode,
            large_data,
            output,
        } => {
            let table = store.get(&register(&store, &input)?)?;
            let options = SeriesOptions {
                mode: mode.into(),
                large_data,
            };
            let charts = build_top_correlations(&table, &x, &target, n, options)?;
            if output.describe {
                return print_json(&charts);
            }
            if charts.is_empty() {
                bail!("No numeric column correlates with '{target}'");
            }
            let format: ImageFormat = output.format.into();
            let dir = output.output.unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            for chart in &charts {
                let other = chart.y2_label().unwrap_or("other");
                let file = format!("{}_vs_{}.{}", slug(&target), slug(other), format.extension());
                write_chart(&renderer, chart, format, &dir.join(file))?;
            }
        }
    }
    Ok(())
}

/// Read `input`, load it into the store under its file stem, return the name.
fn register(store: &DatasetStore, input: &Path) -> Result<String> {
    let bytes = read_input(input)?;
    // Binary spreadsheets go through the base64 Excel path.
    let payload = if bytes.starts_with(b"PK\x03\x04") {
        base64::engine::general_purpose::STANDARD
            .encode(&bytes)
            .into_bytes()
    } else {
        bytes
    };
    let table = load(&payload).with_context(|| format!("Failed to load {}", input.display()))?;
    let name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .unwrap_or("dataset")
        .to_string();
    store.insert(name.clone(), table);
    Ok(name)
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    if input.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))
    }
}

fn write_chart(
    renderer: &Renderer,
    chart: &ChartDescription,
    format: ImageFormat,
    path: &Path,
) -> Result<()> {
    renderer
        .render_to_path(chart, format, path)
        .with_context(|| format!("Failed to render '{}'", chart.title().replace('\n', " ")))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn default_output(input: &Path, kind: &str, format: ImageFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .unwrap_or("chart");
    PathBuf::from(format!("{stem}_{kind}.{}", format.extension()))
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
