//! docket – command-line invoice → PDF generator.
//!
//! Usage:
//!   docket <template.html> <invoice.json> [output.pdf] [flags]
//!
//! If `output.pdf` is omitted the PDF is written to the current directory
//! under the invoice's file name (e.g. `2024-05-01.pdf`).

use std::path::{Path, PathBuf};
use std::{env, fs, process};

use docket_pdf::pipeline::{generate_invoice_pdf, render_invoice_html, Backend, DocketOptions};
use docket_pdf::renderer::PageFormat;
use docket_pdf::template::{FieldValue, UnresolvedPolicy};
use docket_pdf::Invoice;

#[derive(Debug, Default)]
struct Cli {
    template: PathBuf,
    invoice: PathBuf,
    output: Option<PathBuf>,
    options_file: Option<PathBuf>,
    date_format: Option<String>,
    custom: Vec<(String, FieldValue)>,
    scale: Option<f64>,
    format: Option<PageFormat>,
    no_background: bool,
    backend: Backend,
    fragment: bool,
    html_only: bool,
    strict: bool,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("docket");

    let cli = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage(prog);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage(prog);
            process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Cli>, String> {
    let mut cli = Cli::default();
    let mut positional: Vec<PathBuf> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{arg} needs a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--date-format" | "-d" => cli.date_format = Some(value()?),
            "--custom" | "-c" => {
                let pair = value()?;
                let (key, val) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("--custom expects key=value, got {pair:?}"))?;
                cli.custom.push((key.to_string(), custom_value(val)));
            }
            "--scale" | "-s" => {
                let raw = value()?;
                cli.scale = Some(raw.parse().map_err(|_| format!("invalid scale {raw:?}"))?);
            }
            "--format" | "-f" => {
                cli.format = Some(value()?.parse().map_err(|e| format!("{e}"))?);
            }
            "--backend" | "-b" => {
                cli.backend = value()?.parse().map_err(|e| format!("{e}"))?;
            }
            "--options" | "-o" => cli.options_file = Some(PathBuf::from(value()?)),
            "--no-background" => cli.no_background = true,
            "--fragment" => cli.fragment = true,
            "--html-only" => cli.html_only = true,
            "--strict" => cli.strict = true,
            other if other.starts_with('-') => return Err(format!("unknown flag: {other}")),
            path => positional.push(PathBuf::from(path)),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next()) {
        (Some(template), Some(invoice)) => {
            cli.template = template;
            cli.invoice = invoice;
        }
        _ => return Err("a template and an invoice file are required".to_string()),
    }
    cli.output = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {}", extra.display()));
    }
    Ok(Some(cli))
}

/// Integers and finite decimals become numbers, anything else text.
fn custom_value(raw: &str) -> FieldValue {
    if let Ok(n) = raw.parse::<i64>() {
        return FieldValue::from(n);
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(FieldValue::Number)
        .unwrap_or_else(|| FieldValue::from(raw))
}

/// Options file first, flags on top.
fn build_options(cli: &Cli) -> Result<DocketOptions, String> {
    let mut options = match &cli.options_file {
        Some(path) => {
            let json = read(path)?;
            DocketOptions::from_json(&json).map_err(|e| format!("'{}': {e}", path.display()))?
        }
        None => DocketOptions::default(),
    };
    if let Some(f) = &cli.date_format {
        options.date_format = f.clone();
    }
    for (key, value) in &cli.custom {
        options.custom_fields.insert(key.clone(), value.clone());
    }
    if let Some(scale) = cli.scale {
        options.scale = scale;
    }
    if let Some(format) = cli.format {
        options.page_format = format;
    }
    if cli.no_background {
        options.print_background = false;
    }
    if cli.strict {
        options.unresolved = UnresolvedPolicy::Deny;
    }
    Ok(options)
}

fn run(cli: Cli) -> Result<(), String> {
    let options = build_options(&cli)?;
    let source = read(&cli.template)?;
    let invoice_json = read(&cli.invoice)?;

    let invoice =
        Invoice::from_json(&invoice_json).map_err(|e| format!("'{}': {e}", cli.invoice.display()))?;
    let template = options
        .template(&source, cli.fragment)
        .map_err(|e| format!("'{}': {e}", cli.template.display()))?;

    if cli.html_only {
        let rendered =
            render_invoice_html(&template, &invoice, &options).map_err(|e| e.to_string())?;
        match &cli.output {
            Some(path) => write(path, rendered.html.as_bytes())?,
            None => println!("{}", rendered.html),
        }
        return Ok(());
    }

    let renderer = cli.backend.renderer().map_err(|e| e.to_string())?;
    log::info!("rendering with the {} backend", cli.backend);
    let pdf = generate_invoice_pdf(&template, &invoice, &options, renderer.as_ref())
        .map_err(|e| format!("generating PDF: {e}"))?;

    let output = cli.output.unwrap_or_else(|| PathBuf::from(&pdf.filename));
    write(&output, &pdf.bytes)?;
    eprintln!("Wrote '{}' ({} bytes)", output.display(), pdf.bytes.len());
    Ok(())
}

fn read(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("reading '{}': {e}", path.display()))
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), String> {
    // Create output directory if necessary.
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| format!("creating output directory: {e}"))?;
        }
    }
    fs::write(path, bytes).map_err(|e| format!("writing '{}': {e}", path.display()))
}

fn print_usage(prog: &str) {
    eprintln!("docket – invoice template to PDF generator");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <template.html> <invoice.json> [output.pdf] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <template.html>  Template with a <!--BILLABLE--> block");
    eprintln!("  <invoice.json>   Invoice record (id, date, client, billables)");
    eprintln!("  [output.pdf]     Output path (default: the invoice file name,");
    eprintln!("                   e.g. 2024-05-01.pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --date-format, -d <pattern>  Pattern for {{{{date}}}} (default: YYYY-MM-DD)");
    eprintln!("  --custom, -c <key=value>     Value for {{{{custom.key}}}}; repeatable");
    eprintln!("  --scale, -s <n>              Print scale, 0.1 to 2 (default: 1)");
    eprintln!("  --format, -f <name>          A3, A4, A5, Letter, Legal or Tabloid (default: A4)");
    eprintln!("  --backend, -b <name>         chrome or native (default: {})", Backend::default());
    eprintln!("  --options, -o <file.json>    Options file; flags override it");
    eprintln!("  --no-background              Do not print backgrounds");
    eprintln!("  --fragment                   Wrap the template in a sized page shell");
    eprintln!("  --html-only                  Write the substituted HTML instead of a PDF");
    eprintln!("  --strict                     Fail on unresolved placeholders");
    eprintln!("  --help                       Print this message");
}
