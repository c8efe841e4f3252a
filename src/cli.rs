use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};

use crate::Direction;
use crate::impact;
use crate::model::{EditorSession, Shape, ShapeId};
use crate::persist::DocumentFile;

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// The compact textual graph notation.
    Dsl,
    /// The structured JSON document tree.
    Json,
}

impl FileFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "mmd" || ext == "mermaid" || ext == "flow" => Some(FileFormat::Dsl),
            Some(ext) if ext == "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "flowcanvas",
    about = "Convert flowchart documents between the graph DSL and the JSON tree format."
)]
pub struct ConvertArgs {
    /// Path to the input document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Input format (defaults to the input file extension, or DSL).
    #[arg(long = "from")]
    from: Option<FileFormat>,

    /// Output format (defaults to the output file extension, or the opposite
    /// of the input format).
    #[arg(long = "to")]
    to: Option<FileFormat>,

    /// Layout direction assumed when the DSL carries no directive.
    #[arg(short = 'd', long = "direction", default_value = "LR")]
    direction: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "flowcanvas impact",
    about = "Report upstream and downstream reachability for target shapes."
)]
pub struct ImpactArgs {
    /// Path to the input document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Shape to analyze, by label or DSL identifier. Repeatable.
    #[arg(short = 't', long = "target", required = true)]
    targets: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(name = "flowcanvas inspect", about = "Print a summary of a document.")]
pub struct InspectArgs {
    /// Path to the input document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,
}

pub fn run_convert(args: ConvertArgs) -> Result<()> {
    let source = parse_input_source(&args.input);
    let destination = parse_output_destination(&args.output);

    let input_format = args
        .from
        .or_else(|| match &source {
            InputSource::File(path) => FileFormat::from_path(path),
            InputSource::Stdin => None,
        })
        .unwrap_or(FileFormat::Dsl);
    let output_format = args
        .to
        .or_else(|| match &destination {
            OutputDestination::File(path) => FileFormat::from_path(path),
            OutputDestination::Stdout => None,
        })
        .unwrap_or(match input_format {
            FileFormat::Dsl => FileFormat::Json,
            FileFormat::Json => FileFormat::Dsl,
        });

    let default_direction = Direction::from_token(&args.direction)
        .ok_or_else(|| anyhow!("unsupported direction '{}'", args.direction))?;

    let contents = read_source(&source)?;
    let session = load_session(&contents, input_format, default_direction, args.quiet)?;

    let rendered = match output_format {
        FileFormat::Dsl => session.export_dsl(),
        FileFormat::Json => {
            let mut json = DocumentFile::from_session(&session).to_json()?;
            json.push('\n');
            json
        }
    };
    write_destination(&destination, &rendered)?;

    if !args.quiet {
        if let OutputDestination::File(path) = &destination {
            eprintln!("wrote document to {}", path.display());
        }
    }
    Ok(())
}

pub fn run_impact(args: ImpactArgs) -> Result<()> {
    let source = parse_input_source(&args.input);
    let contents = read_source(&source)?;
    let format = match &source {
        InputSource::File(path) => FileFormat::from_path(path).unwrap_or(FileFormat::Dsl),
        InputSource::Stdin => FileFormat::Dsl,
    };
    let session = load_session(&contents, format, Direction::LeftRight, true)?;

    let mut target_ids = Vec::new();
    for target in &args.targets {
        let id = find_shape(session.shapes(), target)
            .ok_or_else(|| anyhow!("no shape matches '{target}'"))?;
        target_ids.push(id);
    }

    let report = impact::analyze(session.connections(), &target_ids);

    let label_of = |id: ShapeId| -> String {
        session
            .shape(id)
            .map(display_name)
            .unwrap_or_else(|| id.to_string())
    };

    println!("targets: {}", args.targets.join(", "));
    println!("upstream ({}):", report.upstream.len());
    for id in &report.upstream {
        println!("  {}", label_of(*id));
    }
    println!("downstream ({}):", report.downstream.len());
    for id in &report.downstream {
        println!("  {}", label_of(*id));
    }
    for per_target in &report.per_target {
        println!(
            "{}: {} upstream, {} downstream",
            label_of(per_target.target),
            per_target.upstream_count,
            per_target.downstream_count
        );
    }
    Ok(())
}

pub fn run_inspect(args: InspectArgs) -> Result<()> {
    let source = parse_input_source(&args.input);
    let contents = read_source(&source)?;
    let format = match &source {
        InputSource::File(path) => FileFormat::from_path(path).unwrap_or(FileFormat::Dsl),
        InputSource::Stdin => FileFormat::Dsl,
    };
    let session = load_session(&contents, format, Direction::LeftRight, true)?;

    fn count_tree(shapes: &[Shape]) -> (usize, usize) {
        let mut shape_count = 0;
        let mut conn_count = 0;
        for shape in shapes {
            shape_count += 1;
            let (nested_shapes, nested_conns) = count_tree(&shape.children);
            shape_count += nested_shapes;
            conn_count += shape.child_connections.len() + nested_conns;
        }
        (shape_count, conn_count)
    }

    let (shape_count, nested_conns) = count_tree(session.shapes());
    println!("direction: {}", session.direction.as_token());
    println!("shapes: {shape_count}");
    println!(
        "connections: {}",
        session.connections().len() + nested_conns
    );
    println!("layers: {}", session.layers().len());
    Ok(())
}

fn load_session(
    contents: &str,
    format: FileFormat,
    default_direction: Direction,
    quiet: bool,
) -> Result<EditorSession> {
    match format {
        FileFormat::Dsl => {
            let mut session = EditorSession::new();
            session.direction = default_direction;
            let warnings = session.import_dsl(contents);
            if !quiet {
                for warning in warnings {
                    eprintln!("warning: {warning}");
                }
            }
            Ok(session)
        }
        FileFormat::Json => Ok(DocumentFile::from_json(contents)?.into_session()),
    }
}

fn find_shape(shapes: &[Shape], needle: &str) -> Option<ShapeId> {
    shapes
        .iter()
        .find(|shape| shape.external_id.as_deref() == Some(needle) || shape.label == needle)
        .map(|shape| shape.id)
}

fn display_name(shape: &Shape) -> String {
    if shape.label.is_empty() {
        shape
            .external_id
            .clone()
            .unwrap_or_else(|| shape.id.to_string())
    } else {
        shape.label.clone()
    }
}

fn parse_input_source(input: &Option<String>) -> InputSource {
    match input.as_deref() {
        None | Some("-") => InputSource::Stdin,
        Some(path) => InputSource::File(PathBuf::from(path)),
    }
}

fn parse_output_destination(output: &Option<String>) -> OutputDestination {
    match output.as_deref() {
        None | Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
    }
}

fn read_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read from stdin")?;
            if buffer.trim().is_empty() {
                bail!("no input provided on stdin");
            }
            Ok(buffer)
        }
        InputSource::File(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display())),
    }
}

fn write_destination(destination: &OutputDestination, contents: &str) -> Result<()> {
    match destination {
        OutputDestination::Stdout => {
            io::stdout()
                .write_all(contents.as_bytes())
                .context("failed to write to stdout")?;
            Ok(())
        }
        OutputDestination::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create directory '{}'", parent.display())
                    })?;
                }
            }
            fs::write(path, contents)
                .with_context(|| format!("failed to write '{}'", path.display()))
        }
    }
}
