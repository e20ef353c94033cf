//! Chunkpack - Command Line Interface
//!
//! Packs a CSV file into chunked, compressed column parts and reads columns back out.
//!
//! # Commands
//!
//! - **`pack`** - Ingests a CSV file and writes a packed directory
//! - **`unpack`** - Writes one column of a packed directory as text, one value per line
//! - **`info`** - Prints the catalog and part layout of a packed directory
//!
//! # Usage Examples
//!
//! ```bash
//! # Pack a CSV with an integer and a string column
//! chunkpack pack people.csv people.packed id:integer name:string
//!
//! # Semicolon separated, with a header row, 1000 rows per chunk
//! chunkpack pack --delimiter ';' --header --chunk-rows 1000 people.csv people.packed id:integer name:string
//!
//! # Write column 1 to a text file
//! chunkpack unpack people.packed 1 names.txt
//!
//! # Inspect a packed directory
//! chunkpack info people.packed
//! ```
//!
//! # Exit Codes
//!
//! - `0` - Success
//! - `1` - Invalid arguments or a failed command

use std::env;
use std::process;

use chunkpack::column_ingest::ColumnSpec;
use chunkpack::config::PackOptions;
use tracing_subscriber::EnvFilter;

/// Global flags accepted before or after the command.
struct Flags {
    options: PackOptions,
    log_level: Option<String>,
    positional: Vec<String>,
}

fn parse_flags(args: &[String]) -> Result<Flags, String> {
    let mut options = PackOptions::default();
    let mut log_level = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("'{}' requires a value", flag))
        };
        match arg.as_str() {
            "--header" => options = options.with_header(true),
            "--verify" => options = options.with_verify_chunks(true),
            "--delimiter" => {
                let text = value("--delimiter")?;
                let delimiter = match text.as_str() {
                    "\\t" | "tab" => b'\t',
                    t if t.len() == 1 => t.as_bytes()[0],
                    t => return Err(format!("delimiter must be a single byte, got '{}'", t)),
                };
                options = options.with_delimiter(delimiter);
            }
            "--chunk-rows" => options = options.with_chunk_rows(parse_number("--chunk-rows", &value("--chunk-rows")?)?),
            "--part-bytes" => options = options.with_part_max_bytes(parse_number("--part-bytes", &value("--part-bytes")?)?),
            "--cascade-depth" => {
                options = options.with_max_cascade_depth(parse_number("--cascade-depth", &value("--cascade-depth")?)?)
            }
            "--log-level" => log_level = Some(value("--log-level")?),
            flag if flag.starts_with("--") => return Err(format!("Unknown option '{}'", flag)),
            _ => positional.push(arg.clone()),
        }
    }
    Ok(Flags {
        options,
        log_level,
        positional,
    })
}

fn parse_number<T: std::str::FromStr>(flag: &str, text: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("'{}' expects a non-negative number, got '{}'", flag, text))
}

/// Installs the fmt subscriber; `--log-level` wins over `RUST_LOG`, which wins over `info`.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Entry point for the chunkpack CLI.
///
/// ```text
/// chunkpack [options] <command> <arguments...>
/// ```
#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_help();
        return;
    }

    let flags = match parse_flags(&args) {
        Ok(flags) => flags,
        Err(message) => {
            eprintln!("Error: {}\n", message);
            print_help();
            process::exit(1);
        }
    };
    init_logging(flags.log_level.as_deref());

    let Some((command, rest)) = flags.positional.split_first() else {
        eprintln!("Error: Not enough arguments\n");
        print_help();
        process::exit(1);
    };

    match command.as_str() {
        "pack" => {
            if rest.len() < 3 {
                eprintln!("Error: 'pack' requires a CSV path, an output directory and at least one column\n");
                print_help();
                process::exit(1);
            }
            handle_pack(&rest[0], &rest[1], &rest[2..], &flags.options).await;
        }
        "unpack" => {
            if rest.len() != 3 {
                eprintln!("Error: 'unpack' requires a directory, a column index and an output path\n");
                print_help();
                process::exit(1);
            }
            let column = match rest[1].parse::<usize>() {
                Ok(column) => column,
                Err(_) => {
                    eprintln!("Error: column index must be a number, got '{}'\n", rest[1]);
                    process::exit(1);
                }
            };
            handle_unpack(&rest[0], column, &rest[2]).await;
        }
        "info" => {
            if rest.len() != 1 {
                eprintln!("Error: 'info' requires exactly one directory\n");
                print_help();
                process::exit(1);
            }
            handle_info(&rest[0]).await;
        }
        _ => {
            eprintln!("Error: Unknown command '{}'\n", command);
            print_help();
            process::exit(1);
        }
    }
}

/// Handles `pack <csv> <out_dir> <name:type>...`.
async fn handle_pack(csv_path: &str, out_dir: &str, column_args: &[String], options: &PackOptions) {
    let columns = match column_args.iter().map(|c| ColumnSpec::parse(c)).collect::<Result<Vec<_>, _>>() {
        Ok(columns) => columns,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    println!("Packing {} into {}", csv_path, out_dir);
    match chunkpack::csv_to_parts(csv_path, out_dir, &columns, options).await {
        Ok(report) => {
            println!("\n✓ Packed {} chunks per column", report.metadata.num_chunks);
            for column in &report.columns {
                println!(
                    "  {:<20} {:<8} parts={:<4} {} -> {} bytes ({:.2}x)",
                    column.column_name,
                    column.column_type,
                    column.num_parts,
                    column.uncompressed_bytes,
                    column.compressed_bytes,
                    column.compression_ratio()
                );
            }
            println!(
                "  Total: {} -> {} bytes ({:.2}x)",
                report.uncompressed_bytes(),
                report.compressed_bytes(),
                report.compression_ratio()
            );
        }
        Err(e) => {
            eprintln!("\n✗ Error during packing: {}", e);
            process::exit(1);
        }
    }
}

/// Handles `unpack <dir> <column> <output>`.
async fn handle_unpack(dir: &str, column: usize, output_path: &str) {
    match chunkpack::decompress_column_into_file(dir, column, output_path).await {
        Ok(rows) => println!("✓ Wrote {} rows of column {} to {}", rows, column, output_path),
        Err(e) => {
            eprintln!("✗ Error unpacking column {}: {}", column, e);
            process::exit(1);
        }
    }
}

/// Handles `info <dir>`.
async fn handle_info(dir: &str) {
    match chunkpack::describe_store(dir).await {
        Ok(description) => {
            println!("================================================================================");
            println!("Packed relation: {}", dir);
            println!("================================================================================");
            print!("{}", description);
        }
        Err(e) => {
            eprintln!("✗ Error reading {}: {}", dir, e);
            process::exit(1);
        }
    }
}

fn print_help() {
    let program = env::args().next().unwrap_or_else(|| "chunkpack".to_string());
    println!("Chunkpack - chunked, compressed columnar storage for CSV data");
    println!();
    println!("USAGE:");
    println!("  {} [options] pack <file.csv> <out_dir> <name:type>...", program);
    println!("  {} [options] unpack <dir> <column> <output>", program);
    println!("  {} [options] info <dir>", program);
    println!("  {} --help", program);
    println!();
    println!("COMMANDS:");
    println!("  pack               Ingest a CSV file and write column parts plus a catalog");
    println!("  unpack             Write one column as text, one value or 'null' per line");
    println!("  info               Show the catalog and the chunks held by every part");
    println!();
    println!("COLUMN TYPES:");
    println!("  integer, smallint, double, float, string; anything else is skipped");
    println!();
    println!("OPTIONS:");
    println!("  --delimiter <c>    Field separator (default ',', 'tab' for tabs)");
    println!("  --header           First CSV row is a header");
    println!("  --chunk-rows <n>   Rows per chunk (default 9999)");
    println!("  --part-bytes <n>   Byte budget of a part file (default 16 MiB)");
    println!("  --cascade-depth <n> Compression cascade depth, 0 stores chunks uncompressed (default 3)");
    println!("  --verify           Decompress and compare every chunk while packing");
    println!("  --log-level <f>    Tracing filter, e.g. 'debug' (default: RUST_LOG or 'info')");
    println!("  --help, -h         Show this help message");
    println!();
    println!("PATHS:");
    println!("  Local paths, s3://bucket/key[?anon=true] and memory://key are accepted.");
}
