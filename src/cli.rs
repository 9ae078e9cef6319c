use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use loreboard::records::DIAGRAM_ATTRIBUTE;
use loreboard::render::frame_diagram;
#[cfg(feature = "server")]
use loreboard::serve::{ServeArgs, run_serve};
use loreboard::{EditorPreferences, RenderOptions, Scene, render_overview_svg, render_svg, schema};

const DEFAULT_OVERVIEW_SIZE: (u32, u32) = (1200, 800);

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

#[derive(Debug, Parser)]
#[command(
    name = "loreboard",
    about = "Render saved relationship diagrams to SVG or PNG."
)]
pub struct RenderArgs {
    /// Diagram blob or exported relationship record (JSON). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Convenience flag to force PNG output without specifying --output-format.
    #[arg(long = "png", action = ArgAction::SetTrue, conflicts_with = "output_format")]
    png: bool,

    /// Scale factor when rasterizing PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// Render the read-only radial network view instead of the canvas.
    #[arg(long = "overview", action = ArgAction::SetTrue)]
    overview: bool,

    /// Canvas width in pixels (defaults to the diagram bounds plus a margin).
    #[arg(long = "width")]
    width: Option<u32>,

    /// Canvas height in pixels (defaults to the diagram bounds plus a margin).
    #[arg(long = "height")]
    height: Option<u32>,

    /// Editor preferences file controlling grid and animation.
    #[arg(long = "preferences")]
    preferences: Option<PathBuf>,

    /// Background color for the rendered diagram.
    #[arg(short = 'b', long = "background-color", default_value = "#f9fafb")]
    background_color: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "svg" => Some(OutputFormat::Svg),
            Some(ext) if ext == "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let format_preference = if cli.png {
        Some(OutputFormat::Png)
    } else {
        cli.output_format
    };

    let output_dest = parse_output(cli.output.as_deref(), &input_source, format_preference)?;
    let format = determine_format(format_preference, &output_dest)?;

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let raw = load_blob(&input_source)?;
    let value: Value = serde_json::from_str(&raw).context("input is not valid JSON")?;
    let diagram = schema::deserialize(unwrap_record(&value))?;

    let preferences = match &cli.preferences {
        Some(path) => EditorPreferences::load(path)?,
        None => EditorPreferences::default(),
    };

    let svg = if cli.overview {
        let mut options = RenderOptions::from_preferences(
            &preferences,
            cli.width.unwrap_or(DEFAULT_OVERVIEW_SIZE.0),
            cli.height.unwrap_or(DEFAULT_OVERVIEW_SIZE.1),
        );
        options.background = cli.background_color.clone();
        render_overview_svg(&diagram, &options)?
    } else {
        let (viewport, framed_width, framed_height) = frame_diagram(&diagram);
        let mut options = RenderOptions::from_preferences(
            &preferences,
            cli.width.unwrap_or(framed_width),
            cli.height.unwrap_or(framed_height),
        );
        options.background = cli.background_color.clone();
        render_svg(&Scene::new(&diagram, &viewport), &options)?
    };

    let output_bytes = match format {
        OutputFormat::Svg => svg.into_bytes(),
        OutputFormat::Png => rasterize(&svg, cli.scale)?,
    };

    write_output(output_dest, &output_bytes, cli.quiet)?;

    Ok(())
}

/// Exported relationship records carry the blob under their attributes.
fn unwrap_record(value: &Value) -> &Value {
    value
        .get("attributes")
        .and_then(|attributes| attributes.get(DIAGRAM_ATTRIBUTE))
        .unwrap_or(value)
}

#[cfg(feature = "raster")]
fn rasterize(svg: &str, scale: f32) -> Result<Vec<u8>> {
    loreboard::render::rasterize_svg(svg, scale)
}

#[cfg(not(feature = "raster"))]
fn rasterize(_svg: &str, _scale: f32) -> Result<Vec<u8>> {
    bail!("PNG output requires the 'raster' feature to be enabled")
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            #[cfg(feature = "server")]
            {
                let serve_args = ServeArgs::parse_from(
                    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
                );
                run_serve(serve_args).await
            }
            #[cfg(not(feature = "server"))]
            {
                Err(anyhow!(
                    "'serve' command requires the 'server' feature to be enabled"
                ))
            }
        }
        Some("render") => {
            let render_args = RenderArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_render(render_args)
        }
        _ => {
            let render_args = RenderArgs::parse_from(args);
            run_render(render_args)
        }
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    let ext = format_hint.unwrap_or(OutputFormat::Svg).extension();
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => match input {
            InputSource::File(path) => Ok(OutputDestination::File(path.with_extension(ext))),
            InputSource::Stdin => Ok(OutputDestination::File(PathBuf::from(format!("out.{ext}")))),
        },
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Svg),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --output-format",
                path.display()
            )
        }),
    }
}

fn load_blob(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no diagram supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated diagram -> {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_output_swaps_the_extension() {
        let input = InputSource::File(PathBuf::from("worlds/court.json"));
        match parse_output(None, &input, Some(OutputFormat::Png)).unwrap() {
            OutputDestination::File(path) => assert_eq!(path, PathBuf::from("worlds/court.png")),
            OutputDestination::Stdout => panic!("expected a file destination"),
        }
    }

    #[test]
    fn format_follows_the_output_extension() {
        let dest = OutputDestination::File(PathBuf::from("web.PNG"));
        assert_eq!(determine_format(None, &dest).unwrap(), OutputFormat::Png);

        let unknown = OutputDestination::File(PathBuf::from("web.txt"));
        assert!(determine_format(None, &unknown).is_err());
        assert_eq!(
            determine_format(None, &OutputDestination::Stdout).unwrap(),
            OutputFormat::Svg
        );
    }

    #[test]
    fn record_exports_are_unwrapped() {
        let record = json!({"id": "r1", "attributes": {"diagram": {"nodes": []}}});
        assert_eq!(unwrap_record(&record), &json!({"nodes": []}));

        let blob = json!({"nodes": [], "connections": []});
        assert_eq!(unwrap_record(&blob), &blob);
    }
}
