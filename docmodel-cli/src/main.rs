use clap::{Parser, Subcommand, ValueEnum};
use docmodel::{Database, DocModelError, Document};
use std::process;

/// docmodel CLI: work with the models of a docmodel data directory
#[derive(Parser)]
#[command(name = "docmodel", version, about)]
struct Cli {
    /// Path to the data directory (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Insert or merge a document
    Save {
        /// Model name
        model: String,
        /// Field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Document ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Get a single document by ID
    Get {
        /// Model name
        model: String,
        /// Document ID
        id: String,
    },

    /// List every document of a model
    List {
        /// Model name
        model: String,
    },

    /// Find documents matching a JSON selector
    Find {
        /// Model name
        model: String,
        /// Selector (e.g. --selector '{"age": {"$gte": 30}}')
        #[arg(long)]
        selector: String,
    },

    /// Update an existing document
    Update {
        /// Model name
        model: String,
        /// Document ID
        id: String,
        /// Field values to update (e.g. --field status=published)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document
    Delete {
        /// Model name
        model: String,
        /// Document ID
        id: String,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Get a document with its references resolved
    Populate {
        /// Model name
        model: String,
        /// Document ID
        id: String,
    },

    /// Check field values against a model's schema without saving
    Validate {
        /// Model name
        model: String,
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Show models and document counts
    Status,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&cli.data_dir)?;

    match cli.command {
        Command::Save { model, fields, id } => {
            let mut data = fields_to_document(&fields);
            if let Some(id) = id {
                data.set_id(id);
            }
            let saved = db.model(&model)?.save(data).await?;
            print_output(&saved.into_value(), &cli.format)?;
        }

        Command::Get { model, id } => {
            let doc = db
                .model(&model)?
                .find_one(&id)
                .await?
                .ok_or_else(|| DocModelError::NotFound { model, id })?;
            print_output(&doc.into_value(), &cli.format)?;
        }

        Command::List { model } => {
            let docs = db.model(&model)?.find_all().await?;
            print_output(&documents_to_value(docs), &cli.format)?;
        }

        Command::Find { model, selector } => {
            let selector: serde_json::Value = serde_json::from_str(&selector)
                .map_err(|e| format!("Invalid selector JSON: {e}"))?;
            let docs = db.model(&model)?.query(&selector).await?;
            print_output(&documents_to_value(docs), &cli.format)?;
        }

        Command::Update { model, id, fields } => {
            let updated = db
                .model(&model)?
                .update(&id, fields_to_document(&fields))
                .await?;
            print_output(&updated.into_value(), &cli.format)?;
        }

        Command::Delete { model, id, dry_run } => {
            let handle = db.model(&model)?;
            if dry_run {
                let doc = handle
                    .find_one(&id)
                    .await?
                    .ok_or_else(|| DocModelError::NotFound { model: model.clone(), id: id.clone() })?;
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": { "model": model, "id": id },
                        "document": doc,
                    }),
                    &cli.format,
                )?;
            } else {
                handle.delete(&id).await?;
                print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
            }
        }

        Command::Populate { model, id } => {
            let doc = db
                .model(&model)?
                .find_one(&id)
                .await?
                .ok_or_else(|| DocModelError::NotFound { model: model.clone(), id })?;
            let populated = db.registry().populate(&model, &doc).await?;
            print_output(&populated.into_value(), &cli.format)?;
        }

        Command::Validate { model, fields } => {
            let handle = db.model(&model)?;
            let mut data = fields_to_document(&fields);
            handle.schema().apply_defaults(&mut data);
            let result = match handle.check(&data) {
                Ok(()) => serde_json::json!({ "valid": true, "errors": [] }),
                Err(DocModelError::ValidationFailed(errors)) => {
                    serde_json::json!({ "valid": false, "errors": errors })
                }
                Err(e) => return Err(e.into()),
            };
            print_output(&result, &cli.format)?;
        }

        Command::Status => {
            let result = db.status().await?;
            print_output(&result, &cli.format)?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

fn fields_to_document(fields: &[(String, String)]) -> Document {
    let mut doc = Document::new();
    for (key, val) in fields {
        // Numbers, booleans, arrays and objects parse as JSON; anything else is a string
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        doc.insert(key.clone(), json_val);
    }
    doc
}

fn documents_to_value(docs: Vec<Document>) -> serde_json::Value {
    serde_json::Value::Array(docs.into_iter().map(Document::into_value).collect())
}
