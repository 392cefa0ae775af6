use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use pagetext::{ContextError, Document, ErrorKind, RenderOptions, Renderer, RendererConfiguration};

#[derive(Parser, Debug)]
#[command(version, about = "Renders a rich-text JSON document into a paginated PDF", long_about = None)]
struct CliArguments {
    #[arg(short = 'd', long = "document", value_name = "json_file")]
    document_path: PathBuf,
    #[arg(short = 'o', long = "output", value_name = "file_path")]
    output_file_path: PathBuf,
    /// Renderer configuration, the defaults are used when missing
    #[arg(short = 'c', long = "configuration", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    /// Number of pages the editor showed for this document
    #[arg(short = 't', long = "target-pages", value_name = "count")]
    target_page_count: Option<NonZeroUsize>,
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), ContextError> {
    let arguments = CliArguments::parse();
    env_logger::builder()
        .filter_level(if arguments.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();
    log::debug!("{:?}", arguments);

    let configuration = match &arguments.configuration_path {
        Some(configuration_path) => RendererConfiguration::from_path(configuration_path)?,
        None => RendererConfiguration::default(),
    };
    let renderer = Renderer::new(configuration)?;

    let document = Document::from_path(&arguments.document_path)?;
    let title = arguments
        .document_path
        .file_stem()
        .map(|file_stem| file_stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".into());
    let rendered_document = renderer
        .render(
            &document,
            &RenderOptions {
                target_page_count: arguments.target_page_count,
                title,
                ..RenderOptions::default()
            },
        )
        .map_err(|error| error.within("Failed to render the document"))?;

    std::fs::write(&arguments.output_file_path, &rendered_document.bytes).map_err(|error| {
        ContextError::with_error(ErrorKind::Io, "Failed to write the output file", &error)
    })?;
    log::info!(
        "Saved the output file with {} pages to the path: {:?}",
        rendered_document.page_count,
        arguments.output_file_path
    );

    Ok(())
}
