use crate::commands::{self, AppState, GetHistoryPayload};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docxtract")]
#[command(about = "Upload a document for extraction, review the result, export or archive it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a file and send it to the extraction service
    Extract {
        /// Path to the document
        file: PathBuf,
        /// Document type (invoice, receipt, packing-list, awb, contract, bank-statement, other)
        #[arg(short = 't', long = "type")]
        document_type: Option<String>,
        /// Review against a stored template id and report missing fields
        #[arg(long)]
        template: Option<String>,
        /// Write an export (json, csv, xlsx)
        #[arg(short, long)]
        export: Option<String>,
        /// Folder for the export; defaults to Downloads
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Save the result to history
        #[arg(short, long)]
        save: bool,
    },
    /// List saved extractions
    History {
        /// Filename search
        query: Option<String>,
        /// Only entries of this document type
        #[arg(short = 't', long = "type")]
        document_type: Option<String>,
        /// Print counts instead of entries
        #[arg(long)]
        stats: bool,
    },
    /// List extraction templates
    Templates,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

pub fn execute(cli: Cli, state: &AppState) -> Result<(), String> {
    match cli.command {
        Commands::Extract {
            file,
            document_type,
            template,
            export,
            out_dir,
            save,
        } => {
            let path = file.to_string_lossy().to_string();
            let mut view = commands::run_extraction(state, path, document_type)?;
            if let Some(id) = template {
                view.session = commands::apply_template(state, id.clone())?;
                for issue in commands::check_against_template(state, id)? {
                    eprintln!("{}: {}", issue.field, issue.message);
                }
            }
            print_json(&view)?;
            if let Some(fmt) = export {
                let dir = out_dir.map(|d| d.to_string_lossy().to_string());
                let written = commands::export_record(state, fmt, dir)?;
                eprintln!("Exported to {}", written);
            }
            if save {
                let stored = commands::save_extraction(state)?;
                eprintln!("Saved to history as {}", stored.id);
            }
        }
        Commands::History {
            query,
            document_type,
            stats,
        } => {
            if stats {
                print_json(&commands::get_history_stats(state)?)?;
                return Ok(());
            }
            let entries = commands::get_history(
                state,
                Some(GetHistoryPayload {
                    search: query,
                    document_type,
                }),
            )?;
            for e in &entries {
                println!("{}  {}  {:<14}  {:>10}  {}", e.id, e.date, e.document_type, e.size, e.filename);
            }
            if entries.is_empty() {
                eprintln!("No saved extractions.");
            }
        }
        Commands::Templates => {
            for t in commands::get_templates(state)? {
                println!(
                    "{}  {}  ({} fields, updated {})",
                    t.id,
                    t.name,
                    t.fields.len(),
                    t.updated_date
                );
            }
        }
    }
    Ok(())
}
