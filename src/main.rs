// 🏷️ Transaction Categorizer CLI
//
// ```bash
// txn-categorizer import statements.csv
// txn-categorizer import-rules rules.json --replace
// txn-categorizer add-category Restaurants 1
// txn-categorizer categorize --apply
// txn-categorizer analyze 4
// txn-categorizer groups
// txn-categorizer review
// ```
//
// # Environment Variables
//
// - `RUST_LOG`: logging verbosity (`debug`, `info`, `warn`)
// - `TXN_CATEGORIZER_CONFIG`: path to a JSON config file
// - `TXN_CATEGORIZER_DB`: database path, overrides the config

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use txn_categorizer::{
    load_csv, load_rules_json, pattern_effectiveness, CategoryDirectory, CategoryId,
    CategoryTree, EngineConfig, NewCategory, PatternSuggestionEngine, RuleBasedCategorizer,
    RuleStore, SimilarityGrouper, SqliteStore, TransactionSource, VERSION,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = EngineConfig::load()?;

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&config, arg(&args, 2, "<file.csv>")?),
        Some("import-rules") => run_import_rules(
            &config,
            arg(&args, 2, "<file.json>")?,
            args.iter().any(|a| a == "--replace"),
        ),
        Some("add-category") => run_add_category(&config, arg(&args, 2, "<name>")?, args.get(3)),
        Some("categories") => run_categories(&config),
        Some("categorize") => run_categorize(&config, args.iter().any(|a| a == "--apply")),
        Some("analyze") => run_analyze(&config, arg(&args, 2, "<category_id>")?),
        Some("groups") => run_groups(&config),
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("review") | None => run_ui_mode(&config),
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing argument {}", name))
}

fn parse_category_id(value: &str) -> Result<CategoryId> {
    let id: i64 = value
        .parse()
        .with_context(|| format!("Invalid category id: {}", value))?;
    Ok(CategoryId(id))
}

fn open_store(config: &EngineConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))
}

fn print_usage() {
    println!("txn-categorizer {}", VERSION);
    println!();
    println!("USAGE:");
    println!("  txn-categorizer import <file.csv>             Import date,description,amount,vendor rows");
    println!("  txn-categorizer import-rules <file.json> [--replace]");
    println!("  txn-categorizer add-category <name> [parent_id]");
    println!("  txn-categorizer categories                    List the category tree");
    println!("  txn-categorizer categorize [--apply]          Run rules over uncategorized transactions");
    println!("  txn-categorizer analyze <category_id>         Suggest rules from a category");
    println!("  txn-categorizer groups                        Cluster uncategorized transactions");
    println!("  txn-categorizer review                        Interactive review (default)");
}

fn run_import(config: &EngineConfig, csv_path: &str) -> Result<()> {
    println!("🗄️  Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let transactions = load_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} transactions from CSV", transactions.len());

    let store = open_store(config)?;

    println!("\n💾 Inserting transactions...");
    let summary = store.insert_transactions(&transactions)?;
    println!("✓ Inserted: {} transactions", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.duplicates);

    println!("\n🔍 Database contains {} transactions", store.count_transactions()?);
    Ok(())
}

fn run_import_rules(config: &EngineConfig, json_path: &str, replace: bool) -> Result<()> {
    let rules = load_rules_json(json_path)?;
    let mut store = open_store(config)?;

    let count = store.import_rules(rules, replace)?;
    println!("✓ Imported {} rules{}", count, if replace { " (replaced existing)" } else { "" });
    println!("✓ Rule store now holds {} rules", store.rules()?.len());
    Ok(())
}

fn run_add_category(config: &EngineConfig, name: &str, parent: Option<&String>) -> Result<()> {
    let mut store = open_store(config)?;

    let new = match parent {
        Some(parent) => NewCategory::child_of(name, parse_category_id(parent)?),
        None => NewCategory::root(name),
    };

    let category = store.add_category(new)?;
    let categories = store.categories()?;
    let tree = CategoryTree::new(&categories);
    println!("✓ Added category {} ({})", category.id, tree.get_path_string(category.id));
    Ok(())
}

fn run_categories(config: &EngineConfig) -> Result<()> {
    let store = open_store(config)?;
    let categories = store.categories()?;

    if categories.is_empty() {
        println!("No categories yet. Add one with: txn-categorizer add-category <name>");
        return Ok(());
    }

    let tree = CategoryTree::new(&categories);
    for root in tree.root_categories() {
        print_category(&tree, root.id, &root.name, 0);
    }
    Ok(())
}

fn print_category(tree: &CategoryTree, id: CategoryId, name: &str, depth: usize) {
    println!("{}{:>4}  {}", "  ".repeat(depth), id, name);
    if depth > 32 {
        return;
    }
    for child in tree.get_children(id) {
        print_category(tree, child.id, &child.name, depth + 1);
    }
}

fn run_categorize(config: &EngineConfig, apply: bool) -> Result<()> {
    let mut store = open_store(config)?;
    let categorizer = RuleBasedCategorizer::from_store(&store)?;

    let uncategorized = store.uncategorized()?;
    println!(
        "🏷️  {} uncategorized transactions, {} rules",
        uncategorized.len(),
        categorizer.rule_count()
    );

    let categorized = categorizer.categorize_batch(&uncategorized);
    let matched: Vec<_> = categorized.iter().filter(|tx| tx.is_categorized()).collect();

    for tx in &matched {
        if let Some(category_id) = tx.category_id {
            println!("  {}  {:<40} → {}", tx.date, truncate(&tx.description, 40), category_id);
        }
    }
    println!("\n✓ Matched {} of {}", matched.len(), uncategorized.len());

    if apply {
        let mut applied = 0;
        for tx in &matched {
            if let Some(rule) = categorizer.matching_rule(&tx.description, tx.vendor.as_deref()) {
                store.apply_rule(tx.id, rule)?;
                applied += 1;
            }
        }
        println!("✓ Applied {} categorizations", applied);
    } else if !matched.is_empty() {
        println!("  (dry run, pass --apply to save)");
    }
    Ok(())
}

fn run_analyze(config: &EngineConfig, category: &str) -> Result<()> {
    let category_id = parse_category_id(category)?;
    let store = open_store(config)?;
    store.validate(category_id)?;

    let members = store.transactions_in_category(category_id)?;
    let all = store.all_transactions()?;
    let engine = PatternSuggestionEngine::new(config.known_vendors.clone());

    println!("💡 Suggestions for category {} ({} transactions)", category_id, members.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let suggestions = engine.analyze(&members, category_id);
    if suggestions.is_empty() {
        println!("No suggestions.");
        return Ok(());
    }

    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "\n{}. {:<30} [{}{}] confidence {:.0}%",
            i + 1,
            s.pattern,
            s.kind.as_str(),
            if s.is_regex { ", regex" } else { "" },
            s.confidence * 100.0
        );
        let effect = pattern_effectiveness(&s.pattern, s.is_regex, &all)?;
        println!(
            "   would match {} transactions ({} unique, total {:.2}), {:.0}% of uncategorized",
            effect.matching_transactions,
            effect.unique_descriptions,
            effect.total_amount,
            effect.impact_on_uncategorized * 100.0
        );
        for sample in &s.sample_matches {
            println!("   · {}", sample);
        }
    }
    Ok(())
}

fn run_groups(config: &EngineConfig) -> Result<()> {
    let store = open_store(config)?;
    let grouper = SimilarityGrouper::with_threshold(config.similarity_threshold);

    let clusters = grouper.group_uncategorized(&store.all_transactions()?);
    println!("🧩 {} clusters of uncategorized transactions", clusters.len());

    for cluster in &clusters {
        let seed = cluster.seed().map(|tx| tx.description.as_str()).unwrap_or("");
        println!(
            "\n{:>4} × {:<40} total {:.2}",
            cluster.count,
            truncate(seed, 40),
            cluster.total_amount
        );
        for s in &cluster.suggestions {
            println!(
                "       {:<32} {:.0}%  ({} matches)",
                s.pattern,
                s.confidence * 100.0,
                s.match_count
            );
        }
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &EngineConfig) -> Result<()> {
    use txn_categorizer::ui;
    use txn_categorizer::ReviewSession;

    if !config.database_path.exists() {
        eprintln!("❌ Database not found: {:?}", config.database_path);
        eprintln!("   Run: txn-categorizer import <file.csv>");
        eprintln!("   to import transactions first.");
        std::process::exit(1);
    }

    let store = open_store(config)?;
    let categories = store.categories()?;
    if categories.is_empty() {
        eprintln!("⚠️  No categories defined. Add some with: txn-categorizer add-category <name>");
    }

    let session = ReviewSession::new(store, config)?;
    let mut app = ui::App::new(session, categories);
    ui::run_ui(&mut app)?;

    let stats = app.session.stats();
    println!(
        "\n✅ Review closed: {} reviewed, {} remaining",
        stats.reviewed, stats.remaining
    );
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &EngineConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    std::process::exit(1);
}
