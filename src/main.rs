use anyhow::{anyhow, bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use segment_builder::condition::{ConditionTree, Conjunction, Operand, Operator, Rule};
use segment_builder::config::{AppConfig, DEFAULT_CONFIG_FILE};
use segment_builder::dataset::Dataset;
use segment_builder::generator::generate;
use segment_builder::schema::FieldType;
use segment_builder::session::{BuilderUpdate, DirectoryPage, Session};
use segment_builder::store::{FilterStore, SledFilterStore};

const PREVIEW_ROWS: usize = 10;

const HELP: &str = "\
commands:
  schema                           list fields, types and operators
  list [term]                      saved filters, newest first
  next | prev                      page through the directory
  new                              start an empty segment
  edit <name>                      load a saved filter into the builder
  tree <json>                      replace the whole condition tree
  add <field> <operator> [v1, v2]  append a rule to the root group
  and | or                         set the root group's conjunction
  show                             print the tree and its compiled query
  sql                              print the segment as PostgreSQL
  apply                            run the segment against the transactions
  save <name>                      save (or rename) the edited segment
  describe <name> [text]           set or clear a saved filter's description
  delete <name>                    delete a saved filter
  help | quit";

enum Flow {
    Continue,
    Quit,
}

/// Loads the configuration file, falling back to defaults when it is unusable
fn load_config() -> AppConfig {
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    match AppConfig::from_json_file(&path) {
        Ok(config) => {
            info!(path = %path, "loaded configuration");
            config
        }
        Err(e) => {
            warn!(error = %e, "using default configuration");
            AppConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config();
    let dataset = generate(&config.generator).context("generating transactions")?;
    let store = SledFilterStore::open(&config.store_path, config.created_by.clone())
        .with_context(|| format!("opening filter store at {}", config.store_path.display()))?;
    let schema = config.schema.clone().unwrap_or_else(|| dataset.schema().clone());
    let mut session = Session::new(schema, config.page_size);

    println!("--- CDP Segment Builder: {} transaction rows loaded ---", dataset.len());
    println!("type 'help' for commands");

    let mut editor = DefaultEditor::new()?;
    loop {
        let prompt = match session.editing() {
            Some(name) => format!("segment[{}]> ", name),
            None => "segment> ".to_string(),
        };
        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = editor.add_history_entry(line) {
                    warn!(error = %e, "could not record history entry");
                }
                match run_command(line, &mut session, &store, &dataset) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("✗ {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn run_command(line: &str, session: &mut Session, store: &dyn FilterStore, dataset: &Dataset) -> Result<Flow> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command.to_ascii_lowercase().as_str() {
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(Flow::Quit),
        "schema" => print_schema(session),
        "list" => {
            let search = Some(rest).filter(|s| !s.is_empty());
            print_directory(&session.directory(store, search)?);
        }
        "next" => print_directory(&session.next_page(store)?),
        "prev" => print_directory(&session.prev_page(store)?),
        "new" => print_update(&session.new_segment()),
        "edit" => match session.edit_segment(store, required(rest, "edit <name>")?) {
            Ok(update) => print_update(&update),
            Err(e) if e.is_not_found() => println!("⚠️ {}; starting an empty segment", e),
            Err(e) => return Err(e.into()),
        },
        "tree" => {
            let tree: ConditionTree = serde_json::from_str(required(rest, "tree <json>")?).context("parsing tree")?;
            print_update(&session.replace_tree(tree)?);
        }
        "add" => {
            let rule = parse_rule(session, rest)?;
            let tree = session.tree().with_child(rule);
            print_update(&session.replace_tree(tree)?);
        }
        "and" | "or" => {
            let conjunction = if command.eq_ignore_ascii_case("or") { Conjunction::Or } else { Conjunction::And };
            let tree = session.tree().with_conjunction(conjunction);
            print_update(&session.replace_tree(tree)?);
        }
        "show" => {
            println!("{}", serde_json::to_string_pretty(session.tree())?);
            println!("query: {}", session.query()?);
        }
        "sql" => println!("{}", session.sql()?),
        "apply" => {
            let outcome = session.apply(dataset)?;
            println!("query:     {}", display_query(&outcome.query));
            println!("evaluated: {}", display_query(&outcome.rewritten));
            println!("matched {} of {} rows", outcome.matched(), outcome.total);
            println!("ESTIMATED TOTAL SALES: Rp {:.0}", outcome.total_sales);
            let names: Vec<&str> = dataset.schema().fields().iter().map(|f| f.name.as_str()).collect();
            println!("{}", names.join(" | "));
            for row in outcome.preview(PREVIEW_ROWS) {
                let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join(" | "));
            }
        }
        "save" => {
            let saved = session.save(store, required(rest, "save <name>")?)?;
            println!("✅ saved '{}'", saved.name);
        }
        "describe" => {
            let (name, text) = match rest.split_once(char::is_whitespace) {
                Some((name, text)) => (name, Some(text)),
                None => (required(rest, "describe <name> [text]")?, None),
            };
            let saved = store.describe(name, text)?;
            println!("✅ '{}': {}", saved.name, saved.description.as_deref().unwrap_or("-"));
        }
        "delete" => {
            let name = required(rest, "delete <name>")?;
            if session.delete(store, name)? {
                println!("✅ deleted '{}'", name);
            } else {
                println!("nothing named '{}'", name);
            }
        }
        other => bail!("unknown command '{}', try 'help'", other),
    }
    Ok(Flow::Continue)
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(anyhow!("usage: {}", usage))
    } else {
        Ok(value)
    }
}

/// `<field> <operator> [v1, v2, ...]`, values typed after the field
fn parse_rule(session: &Session, input: &str) -> Result<Rule> {
    let mut parts = input.splitn(3, char::is_whitespace);
    let field = parts.next().filter(|f| !f.is_empty()).ok_or_else(|| anyhow!("usage: add <field> <operator> [values]"))?;
    let operator: Operator = parts
        .next()
        .ok_or_else(|| anyhow!("missing operator for '{}'", field))?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let field_type = session.schema().field(field).map_or(FieldType::Text, |f| f.field_type);
    let value = parts
        .next()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|raw| Operand::from_input(raw, field_type))
        .collect();

    Ok(Rule::new(field, operator, value))
}

fn display_query(query: &str) -> &str {
    if query.is_empty() {
        "(all rows)"
    } else {
        query
    }
}

fn print_schema(session: &Session) {
    for field in session.schema().fields() {
        let operators: Vec<&str> = field.allowed_operators().iter().map(|op| op.as_str()).collect();
        println!("{:<22} {:<7} {}", field.name, field.field_type.to_string(), operators.join(", "));
        if !field.list_values.is_empty() {
            println!("{:<30} values: {}", "", field.list_values.join(", "));
        }
    }
}

fn print_directory(page: &DirectoryPage) {
    println!("saved filters: {} (page {}/{})", page.total, page.page + 1, page.pages);
    for filter in &page.filters {
        println!(
            "  {:<30} {}  by {}{}",
            filter.name,
            filter.created_at.format("%Y-%m-%d %H:%M"),
            filter.created_by,
            filter.description.as_deref().map(|d| format!("  ({})", d)).unwrap_or_default(),
        );
    }
}

fn print_update(update: &BuilderUpdate) {
    println!("query: {}", display_query(&update.query));
}
