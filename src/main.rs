use anyhow::Result;
use clap::Parser;
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use quill::config::{DiagramConfig, TransportConfig, config};
use quill::logging;
use quill::transport;
use quill::tui::App;
use quill::tui::mermaid::CliCompiler;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::Stdout;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version = env!("QUILL_VERSION"))]
#[command(about = "Terminal chat client that renders prose, code, and diagrams")]
struct Args {
    /// Transport command (reads the prompt on stdin, streams the reply
    /// on stdout); overrides the config file
    #[arg(long)]
    transport_cmd: Option<String>,

    /// Diagram compiler command (description on stdin, SVG on stdout);
    /// overrides the config file
    #[arg(long)]
    diagram_cmd: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();
    logging::info(&format!("quill {} starting", env!("QUILL_VERSION")));

    let transport_config = match args.transport_cmd {
        Some(command) => TransportConfig {
            command,
            args: Vec::new(),
        },
        None => config().transport.clone(),
    };
    let diagram_config = match args.diagram_cmd {
        Some(command) => DiagramConfig {
            command,
            args: Vec::new(),
        },
        None => config().diagram.clone(),
    };

    let transport: Arc<dyn transport::Transport> =
        Arc::from(transport::from_config(&transport_config));
    let compiler = Arc::new(CliCompiler::from_config(&diagram_config));

    // Restore the terminal even on panic
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        default_hook(info);
    }));

    let mut terminal = setup_terminal()?;
    let result = App::new(transport, compiler).run(&mut terminal).await;
    restore_terminal()?;

    logging::info("quill exiting");
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    Ok(())
}
