use crate::models::{ChatMessage, Document, RagModel, RagSettings, RagSettingsPatch, Role};
use crate::store::{available_models, ChatSession, DocumentStore, SettingsStore};
use crate::upload::FileUpload;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "\
commands:
  docs                  list cached documents
  refresh               reload documents from the backend
  upload <path>         upload a file
  rm <id>               delete a document
  toggle <id>           toggle whether a document is used for answers
  ask <question>        ask the assistant
  history               show the conversation
  clear                 clear the conversation
  settings              show retrieval settings
  set <field> <value>   change one setting (chunk_size, chunk_overlap, retrieval_k, temperature, model)
  models                list models
  help                  show this text
  quit                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Docs,
    Refresh,
    Upload(PathBuf),
    Remove(String),
    Toggle(String),
    Ask(String),
    History,
    Clear,
    Settings,
    Set(RagSettingsPatch),
    Models,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let need = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("usage: {} <{}>", head, what))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match head {
        "docs" | "ls" => Command::Docs,
        "refresh" => Command::Refresh,
        "upload" => Command::Upload(PathBuf::from(need("path")?)),
        "rm" | "delete" => Command::Remove(need("id")?),
        "toggle" => Command::Toggle(need("id")?),
        "ask" => Command::Ask(need("question")?),
        "history" => Command::History,
        "clear" => Command::Clear,
        "settings" => Command::Settings,
        "set" => Command::Set(parse_setting(rest)?),
        "models" => Command::Models,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command `{}`; try `help`", other)),
    };
    Ok(Some(command))
}

fn parse_setting(args: &str) -> Result<RagSettingsPatch, String> {
    let (field, value) = args
        .split_once(char::is_whitespace)
        .map(|(f, v)| (f, v.trim()))
        .ok_or_else(|| "usage: set <field> <value>".to_string())?;
    let mut patch = RagSettingsPatch::default();
    match field {
        "chunk_size" => {
            patch.chunk_size = Some(value.parse::<u32>().map_err(|e| invalid(field, e))?)
        }
        "chunk_overlap" => {
            patch.chunk_overlap = Some(value.parse::<u32>().map_err(|e| invalid(field, e))?)
        }
        "retrieval_k" => {
            patch.retrieval_k = Some(value.parse::<u32>().map_err(|e| invalid(field, e))?)
        }
        "temperature" => {
            patch.temperature = Some(value.parse::<f32>().map_err(|e| invalid(field, e))?)
        }
        "model" => {
            patch.model = Some(
                RagModel::from_id(value).ok_or_else(|| format!("unknown model `{}`", value))?,
            )
        }
        other => return Err(format!("unknown setting `{}`", other)),
    }
    Ok(patch)
}

fn invalid(field: &str, e: impl std::fmt::Display) -> String {
    format!("invalid value for {}: {}", field, e)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn format_document(doc: &Document) -> String {
    format!(
        "[{}] {:<36} {:<10} {:>10}  {:?}",
        if doc.selected { "x" } else { " " },
        doc.id,
        format!("{:?}", doc.status).to_lowercase(),
        format_size(doc.size),
        doc.name
    )
}

fn format_message(msg: &ChatMessage) -> String {
    let who = match msg.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    let mut out = format!("{}: {}", who, msg.content);
    for source in msg.sources.iter().flatten() {
        out.push_str(&format!(
            "\n    source: {} (relevance {:.0}%)",
            source.document_name,
            source.relevance_score * 100.0
        ));
        for excerpt in &source.excerpts {
            out.push_str(&format!("\n      \"{}\"", excerpt));
        }
    }
    out
}

fn format_settings(settings: &RagSettings) -> String {
    format!(
        "chunk_size={} chunk_overlap={} retrieval_k={} temperature={} model={}",
        settings.chunk_size,
        settings.chunk_overlap,
        settings.retrieval_k,
        settings.temperature,
        settings.model.id()
    )
}

/// State behind the interactive prompt.
pub struct Shell {
    pub documents: DocumentStore,
    pub chat: ChatSession,
    pub settings: SettingsStore,
}

impl Shell {
    /// Runs one command and returns the text to print, or `None` to exit.
    pub async fn execute(&mut self, command: Command) -> Option<String> {
        let output = match command {
            Command::Quit => return None,
            Command::Help => HELP.to_string(),
            Command::Docs => self.render_documents(),
            Command::Refresh => {
                self.documents.refresh().await;
                self.render_documents()
            }
            Command::Upload(path) => match FileUpload::from_path(&path).await {
                Ok(file) => match self.documents.upload(file).await {
                    Some(doc) => format!("uploaded {} as {} ({:?})", doc.name, doc.id, doc.status),
                    None => self.store_error(),
                },
                Err(e) => format!("error: {}", e),
            },
            Command::Remove(id) => {
                if self.documents.remove(&id).await {
                    format!("deleted {}", id)
                } else {
                    self.store_error()
                }
            }
            Command::Toggle(id) => {
                if self.documents.toggle_selection(&id).await {
                    self.render_documents()
                } else if self.documents.get(&id).is_none() {
                    format!("no cached document {}; try `refresh`", id)
                } else {
                    self.store_error()
                }
            }
            Command::Ask(question) => {
                let before = self.chat.messages().len();
                self.chat.send(&question).await;
                self.chat.messages()[before..]
                    .iter()
                    .filter(|m| m.role != Role::User)
                    .map(format_message)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Command::History => {
                self.chat.ensure_seeded();
                self.chat
                    .messages()
                    .iter()
                    .map(format_message)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Command::Clear => {
                self.chat.clear();
                "conversation cleared".to_string()
            }
            Command::Settings => {
                if !self.settings.is_loaded() && !self.settings.load().await {
                    format!(
                        "error: {}",
                        self.settings.error().unwrap_or("failed to load settings")
                    )
                } else {
                    format_settings(&self.settings.current())
                }
            }
            Command::Set(patch) => {
                if self.settings.save(patch).await {
                    format_settings(&self.settings.current())
                } else {
                    format!(
                        "error: {}",
                        self.settings.error().unwrap_or("failed to save settings")
                    )
                }
            }
            Command::Models => available_models()
                .iter()
                .map(|m| format!("{:<20} {}", m.id, m.name))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Some(output)
    }

    fn render_documents(&self) -> String {
        if let Some(e) = self.documents.error() {
            return format!("error: {}", e);
        }
        if self.documents.documents().is_empty() {
            return "no documents".to_string();
        }
        self.documents
            .documents()
            .iter()
            .map(format_document)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn store_error(&self) -> String {
        format!(
            "error: {}",
            self.documents.error().unwrap_or("An unknown error occurred")
        )
    }

    /// Read commands from stdin until `quit` or end of input.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"rag-desk ready, type `help` for commands\n").await?;

        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let output = match parse_command(&line) {
                Ok(None) => continue,
                Ok(Some(command)) => match self.execute(command).await {
                    Some(output) => output,
                    None => break,
                },
                Err(e) => e,
            };
            stdout.write_all(output.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        Ok(())
    }
}
