//! CLI front end for building and querying HTM tree files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use htm_tree::config::BuildConfig;
use htm_tree::entry_store::{EntryStore, FieldDesc, FieldType};
use htm_tree::region::{Circle, Ellipse, Polygon, Shape};
use htm_tree::tree::{build_tree_file, TreeHandle};
use htm_tree::vec3::{SphericalCoord, V3};
use htm_tree::{query, range_cover};

macro_rules! die {
    ($fmt:literal $(, $arg:expr)*) => {{
        eprintln!($fmt $(, $arg)*);
        std::process::exit(1)
    }};
}

#[derive(Parser, Debug)]
#[command(name = "htm")]
#[command(about = "Spatial index and query engine for point data on the sphere")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a tree file from one or more delimited text input files.
    Build {
        out_path: PathBuf,
        in_files: Vec<PathBuf>,
        #[arg(long, default_value_t = 1024)]
        blk_size: u32,
        #[arg(long, default_value_t = '|')]
        delim: char,
        #[arg(long, default_value_t = 512)]
        max_mem: u32,
        #[arg(long, default_value_t = 1024)]
        tree_min: u64,
        #[arg(long, default_value_t = 64)]
        leaf_thresh: u64,
    },
    /// Print HTM ids or ranges covering a region.
    Ids {
        level: i32,
        #[command(subcommand)]
        shape: ShapeArg,
        #[arg(long)]
        decimal: bool,
        #[arg(long)]
        ranges: bool,
        #[arg(long, default_value_t = 64)]
        max_ranges: usize,
    },
    /// Query a record file for points matching a region.
    Count {
        file: PathBuf,
        #[command(subcommand)]
        shape: ShapeArg,
        #[arg(long)]
        estimate: bool,
        #[arg(long)]
        print: bool,
        #[arg(long)]
        json: bool,
        /// Pin the tree (and small record sets) in physical memory.
        #[arg(long)]
        lock_in_memory: bool,
        /// Resident-size ceiling, in bytes, under which the record
        /// mapping also gets pinned when `--lock-in-memory` is set.
        #[arg(long, default_value_t = 64 * 1024 * 1024)]
        datathresh: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum ShapeArg {
    Circle { lon_deg: f64, lat_deg: f64, radius_deg: f64 },
    Ellipse { lon_deg: f64, lat_deg: f64, a_deg: f64, b_deg: f64, pa_deg: f64 },
    Hull { points: Vec<String> },
    /// Matches every point; useful for smoke-testing a build.
    Test,
}

fn parse_lon_lat(s: &str) -> Option<(f64, f64)> {
    let (lon, lat) = s.split_once(',')?;
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}

fn build_shape(arg: &ShapeArg) -> htm_tree::Result<Shape> {
    match arg {
        ShapeArg::Circle { lon_deg, lat_deg, radius_deg } => {
            let center = SphericalCoord::new(*lon_deg, *lat_deg).to_v3();
            Ok(Circle::new(center, *radius_deg)?.into())
        }
        ShapeArg::Ellipse { lon_deg, lat_deg, a_deg, b_deg, pa_deg } => {
            let center = SphericalCoord::new(*lon_deg, *lat_deg).to_v3();
            Ok(Ellipse::new(center, *a_deg, *b_deg, *pa_deg)?.into())
        }
        ShapeArg::Hull { points } => {
            let verts: Vec<V3> = points
                .iter()
                .map(|p| {
                    let (lon, lat) = parse_lon_lat(p)
                        .unwrap_or_else(|| die!("bad hull point '{p}', expected 'lon,lat'"));
                    SphericalCoord::new(lon, lat).to_v3()
                })
                .collect();
            Ok(Polygon::from_hull(&verts)?.into())
        }
        ShapeArg::Test => Ok(Circle::all_sky().into()),
    }
}

fn cmd_build(
    out_path: PathBuf,
    in_files: Vec<PathBuf>,
    blk_size: u32,
    delim: char,
    max_mem: u32,
    tree_min: u64,
    leaf_thresh: u64,
) {
    let config = BuildConfig::default()
        .blk_size_kib(blk_size)
        .delim(delim)
        .max_mem_mib(max_mem)
        .tree_min(tree_min)
        .leaf_thresh(leaf_thresh);
    if let Err(e) = config.validate() {
        die!("{e}");
    }

    let records_path = out_path.with_extension("rec");
    let mut bytes = Vec::new();
    let mut count = 0u64;
    for path in &in_files {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => die!("opening {}: {e}", path.display()),
        };
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => die!("reading {}: {e}", path.display()),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(config.delim);
            let lon: f64 = match fields.next().and_then(|s| s.trim().parse().ok()) {
                Some(v) => v,
                None => die!("malformed record line: {line}"),
            };
            let lat: f64 = match fields.next().and_then(|s| s.trim().parse().ok()) {
                Some(v) => v,
                None => die!("malformed record line: {line}"),
            };
            let v = SphericalCoord::new(lon, lat).to_v3();
            bytes.extend_from_slice(&v.x.to_le_bytes());
            bytes.extend_from_slice(&v.y.to_le_bytes());
            bytes.extend_from_slice(&v.z.to_le_bytes());
            count += 1;
        }
    }
    if let Err(e) = std::fs::write(&records_path, &bytes) {
        die!("writing {}: {e}", records_path.display());
    }

    let fields = vec![
        FieldDesc { name: "x".into(), ty: FieldType::F64, offset: 0 },
        FieldDesc { name: "y".into(), ty: FieldType::F64, offset: 8 },
        FieldDesc { name: "z".into(), ty: FieldType::F64, offset: 16 },
    ];
    let entries = match EntryStore::open_file(&records_path, 24, fields) {
        Ok(e) => e,
        Err(e) => die!("{e}"),
    };

    if count >= config.tree_min {
        let tree_path = out_path.with_extension("htm");
        if let Err(e) = build_tree_file(&records_path, &entries, &tree_path, config.mem_budget_bytes(), config.leaf_thresh) {
            die!("{e}");
        }
        log::info!("built tree over {count} records at {}", tree_path.display());
    } else {
        log::info!("{count} records below --tree-min {}, skipping tree", config.tree_min);
    }
}

fn cmd_ids(level: i32, shape: &ShapeArg, decimal: bool, ranges: bool, max_ranges: usize) {
    let shape = build_shape(shape).unwrap_or_else(|e| die!("{e}"));
    if ranges {
        let list = range_cover::cover(&shape, level, max_ranges).unwrap_or_else(|e| die!("{e}"));
        let parts: Vec<String> = list.ranges().iter().map(|r| format!("{} {}", r.min, r.max)).collect();
        println!("{}", parts.join(" "));
    } else {
        let list = range_cover::cover(&shape, level, max_ranges).unwrap_or_else(|e| die!("{e}"));
        for r in list.ranges() {
            for id in r.min..=r.max {
                if decimal {
                    println!("{}", htm_tree::htm_id::dec_encode(id));
                } else {
                    println!("{id}");
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_count(
    file: PathBuf,
    shape: &ShapeArg,
    estimate: bool,
    print: bool,
    json: bool,
    lock_in_memory: bool,
    datathresh: u64,
) {
    let shape = build_shape(shape).unwrap_or_else(|e| die!("{e}"));
    let fields = vec![
        FieldDesc { name: "x".into(), ty: FieldType::F64, offset: 0 },
        FieldDesc { name: "y".into(), ty: FieldType::F64, offset: 8 },
        FieldDesc { name: "z".into(), ty: FieldType::F64, offset: 16 },
    ];
    let tree_path = file.with_extension("htm");
    let mut handle = match TreeHandle::open(&file, 24, fields, &tree_path) {
        Ok(h) => h,
        Err(e) => {
            print_error(json, &e.to_string());
            std::process::exit(1);
        }
    };
    if lock_in_memory {
        if let Err(e) = handle.lock_in_memory(datathresh) {
            log::warn!("lock-in-memory failed, continuing without it: {e}");
        }
    }
    let entries = handle.entries();
    let reader = handle.tree();

    if print {
        let result = query::enumerate(entries, reader, &shape, |i| {
            if let Ok(p) = entries.point(i) {
                println!("{} {} {}", p.x, p.y, p.z);
            }
        });
        if let Err(e) = result {
            print_error(json, &e.to_string());
            std::process::exit(1);
        }
        return;
    }

    if estimate {
        match query::estimate(entries, reader, &shape) {
            Ok(r) => {
                if json {
                    println!("{{\"stat\":\"OK\",\"min\":{},\"max\":{}}}", r.min, r.max);
                } else {
                    println!("{} {}", r.min, r.max);
                }
            }
            Err(e) => {
                print_error(json, &e.to_string());
                std::process::exit(1);
            }
        }
        return;
    }

    match query::count(entries, reader, &shape) {
        Ok(n) => {
            if json {
                println!("{{\"stat\":\"OK\",\"count\":{n}}}");
            } else {
                println!("{n}");
            }
        }
        Err(e) => {
            print_error(json, &e.to_string());
            std::process::exit(1);
        }
    }
}

fn print_error(json: bool, msg: &str) {
    if json {
        println!("{{\"stat\":\"ERROR\",\"msg\":\"{}\"}}", msg.replace('"', "'"));
    } else {
        eprintln!("error: {msg}");
    }
}

fn main() {
    let cli = Cli::parse();
    let level_filter = htm_tree_tool::init_tracing();
    log::debug!("htm starting, log level {level_filter}");

    match cli.command {
        Command::Build { out_path, in_files, blk_size, delim, max_mem, tree_min, leaf_thresh } => {
            cmd_build(out_path, in_files, blk_size, delim, max_mem, tree_min, leaf_thresh);
        }
        Command::Ids { level, shape, decimal, ranges, max_ranges } => {
            cmd_ids(level, &shape, decimal, ranges, max_ranges);
        }
        Command::Count { file, shape, estimate, print, json, lock_in_memory, datathresh } => {
            cmd_count(file, &shape, estimate, print, json, lock_in_memory, datathresh);
        }
    }
}

mod htm_tree_tool {
    use tracing_subscriber::{
        filter::{EnvFilter, LevelFilter},
        prelude::*,
        registry::Registry,
    };

    pub fn init_tracing() -> LevelFilter {
        let level_filter = LevelFilter::WARN;
        tracing_log::LogTracer::init().expect("failed to install log-to-tracing bridge");

        let registry = Registry::default();
        let env_filter = EnvFilter::builder()
            .with_default_directive(level_filter.into())
            .with_env_var("HTM_LOG")
            .from_env_lossy();
        let subscriber = registry.with(env_filter).with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        );
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("INTERNAL ERROR: setting default tracing subscriber failed");
            std::process::exit(1);
        }

        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing_panic::panic_hook(info);
            prev_hook(info);
        }));

        level_filter
    }
}
