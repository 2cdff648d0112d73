//! CLI entry point for karabiner-chords
//!
//! Manages the chord library, publishes it to Karabiner-Elements and runs
//! capture mode. `quick` only touches the side log, so it stays fast
//! enough to bind to a key.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use karabiner_chord_manager::cache::{CacheWatcher, QuickCache, ReconcileReport};
use karabiner_chord_manager::capture::{
    CapturePrompt, ConflictChoice, KeyEvent, OutputResponse,
};
use karabiner_chord_manager::config::{expand_path, Settings, TimingUpdate};
use karabiner_chord_manager::controller::{Controller, ListOrder};
use karabiner_chord_manager::core::parser::{parse_batch_file, parse_key_sequence, parse_key_spec};
use karabiner_chord_manager::core::{
    Chord, ChordId, ChordSelector, KeySet, Overlap, OutputSpec, SearchScope,
};
use karabiner_chord_manager::engine::{EngineMode, EngineOptions, KarabinerEngine};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::str::FromStr;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "karabiner-chords")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default ~/.config/karabiner-chords/settings.toml)
    #[arg(long, global = true)]
    settings: Option<String>,

    /// Render and validate only; never write any file
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a chord, or a batch of chords from a file
    Add {
        /// Keys pressed together, e.g. "t+h" or "th"
        #[arg(value_name = "KEYS", required_unless_present = "batch")]
        input: Option<String>,

        /// What the chord produces
        #[arg(value_name = "OUTPUT", required_unless_present = "batch")]
        output: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// OUTPUT is a shell command
        #[arg(long, conflicts_with = "key_sequence")]
        shell: bool,

        /// OUTPUT is a key sequence, e.g. "cmd+c cmd+v"
        #[arg(long = "keys")]
        key_sequence: bool,

        /// File with one "keys,output" entry per line
        #[arg(short, long, conflicts_with_all = ["input", "output"])]
        batch: Option<String>,
    },

    /// Remove a chord by keys, output text or id
    Remove {
        #[arg(value_name = "KEYS")]
        input: Option<String>,

        #[arg(long)]
        output: Option<String>,

        #[arg(long)]
        id: Option<String>,
    },

    /// Change a chord's output or category
    Edit {
        id: String,

        #[arg(long)]
        output: Option<String>,

        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,

        #[arg(long)]
        clear_category: bool,

        #[arg(long, conflicts_with = "key_sequence")]
        shell: bool,

        #[arg(long = "keys")]
        key_sequence: bool,
    },

    /// List chords
    List {
        #[arg(long)]
        category: Option<String>,

        #[arg(long, value_enum, default_value_t = SortKey::Created)]
        sort: SortKey,
    },

    /// Search chords by keys and output
    Search {
        query: String,

        /// Match input keys only
        #[arg(long, conflicts_with = "output")]
        input: bool,

        /// Match output only
        #[arg(long)]
        output: bool,
    },

    /// Remove the most recently added chords
    Undo {
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Show library statistics
    Stats {
        /// List every chord by category
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show or change timing settings; changes republish every chord
    Config {
        /// Show the current settings
        #[arg(long)]
        show: bool,

        /// Profile-wide simultaneous threshold in ms
        #[arg(long)]
        chord_timeout: Option<u64>,

        /// Window for 2-key chords in ms
        #[arg(long)]
        two_keys: Option<u64>,

        #[arg(long)]
        three_keys: Option<u64>,

        #[arg(long)]
        four_keys: Option<u64>,

        /// Window for chords of 5 keys and more in ms
        #[arg(long)]
        five_plus_keys: Option<u64>,
    },

    /// List library backups, or restore one
    Backups {
        /// Backup file to restore, or "latest"
        #[arg(long)]
        restore: Option<String>,
    },

    /// Recompile and republish every chord
    Refresh,

    /// Apply chords queued by `quick`
    Sync {
        /// Keep running and sync whenever the queue changes
        #[arg(long)]
        watch: bool,
    },

    /// Queue a chord without loading the library
    Quick {
        keys: String,
        output: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// List chord groups, or enable/disable one
    Groups {
        #[arg(long, conflicts_with = "disable")]
        enable: Option<String>,

        #[arg(long)]
        disable: Option<String>,
    },

    /// Select the chord profile in Karabiner-Elements
    Activate,

    /// Define chords by pressing them
    Capture {
        /// Key event stream ("down a", "up a", "+a", "-a"); stdin if omitted
        #[arg(long)]
        events: Option<String>,
    },

    /// Write the compiled rules as a complex-modification file
    Export { path: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortKey {
    Input,
    Output,
    Created,
}

impl From<SortKey> for ListOrder {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Input => ListOrder::Input,
            SortKey::Output => ListOrder::Output,
            SortKey::Created => ListOrder::Created,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;
    let mode = if cli.dry_run {
        EngineMode::DryRun
    } else {
        EngineMode::Live
    };

    // No library load on the fast path
    if let Commands::Quick { keys, output, category } = &cli.command {
        return quick(&settings, keys, output, category.as_deref(), mode);
    }

    let engine = KarabinerEngine::new(
        settings.karabiner_config_path(),
        EngineOptions::from_settings(&settings),
        mode,
    )?;
    let controller = Controller::open(settings, Some(settings_path), engine, mode)?;

    if mode == EngineMode::DryRun {
        println!("{} Dry run, nothing will be written", "ℹ".blue());
    }

    match cli.command {
        Commands::Add {
            input,
            output,
            category,
            shell,
            key_sequence,
            batch,
        } => match batch {
            Some(batch) => add_batch(&controller, &batch, category),
            None => add(&controller, input, output, category, shell, key_sequence, cli.dry_run),
        },
        Commands::Remove { input, output, id } => remove(&controller, input, output, id),
        Commands::Edit {
            id,
            output,
            category,
            clear_category,
            shell,
            key_sequence,
        } => edit(&controller, &id, output, category, clear_category, shell, key_sequence),
        Commands::List { category, sort } => list(&controller, category.as_deref(), sort.into()),
        Commands::Search { query, input, output } => {
            let scope = match (input, output) {
                (true, _) => SearchScope::Input,
                (_, true) => SearchScope::Output,
                _ => SearchScope::Both,
            };
            search(&controller, &query, scope)
        }
        Commands::Undo { count } => undo(&controller, count),
        Commands::Stats { detailed } => stats(&controller, detailed),
        Commands::Config {
            show,
            chord_timeout,
            two_keys,
            three_keys,
            four_keys,
            five_plus_keys,
        } => {
            let update = TimingUpdate {
                chord_timeout_ms: chord_timeout,
                two_keys,
                three_keys,
                four_keys,
                five_plus_keys,
            };
            config(&controller, show, &update)
        }
        Commands::Backups { restore } => backups(&controller, restore.as_deref()),
        Commands::Refresh => refresh(&controller),
        Commands::Sync { watch } => sync(&controller, watch),
        Commands::Quick { .. } => Ok(()),
        Commands::Groups { enable, disable } => groups(&controller, enable, disable),
        Commands::Activate => {
            let profile = controller.activate()?;
            println!("{} Profile '{}' activated", "✓".green(), profile.bold());
            Ok(())
        }
        Commands::Capture { events } => capture(&controller, events),
        Commands::Export { path } => {
            let path = expand_path(&path);
            let rules = controller.export(&path)?;
            println!("{} Exported {} rules to {}", "✓".green(), rules, path.display());
            Ok(())
        }
    }
}

fn parse_keys(spec: &str) -> anyhow::Result<Vec<String>> {
    parse_key_spec(spec).with_context(|| format!("Invalid key spec '{}'", spec))
}

fn parse_output(raw: &str, shell: bool, key_sequence: bool) -> anyhow::Result<OutputSpec> {
    Ok(match (shell, key_sequence) {
        (true, _) => OutputSpec::shell(raw),
        (_, true) => OutputSpec::KeySequence(parse_key_sequence(raw)?),
        _ => OutputSpec::text(raw),
    })
}

fn print_chord(chord: &Chord) {
    let category = chord
        .category
        .as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default();

    println!(
        "{} → {}{}  {}",
        chord.input_keys.to_string().cyan().bold(),
        chord.output.to_string().green(),
        category.magenta(),
        chord.id.to_string().dimmed()
    );
}

fn print_overlaps(overlaps: &[Overlap]) {
    for overlap in overlaps {
        println!("  {} {}", "⚠".yellow(), overlap);
    }
}

fn add(
    controller: &Controller<KarabinerEngine>,
    input: Option<String>,
    output: Option<String>,
    category: Option<String>,
    shell: bool,
    key_sequence: bool,
    check_only: bool,
) -> anyhow::Result<()> {
    let input = input.ok_or_else(|| anyhow!("KEYS is required"))?;
    let output = output.ok_or_else(|| anyhow!("OUTPUT is required"))?;
    let keys = parse_keys(&input)?;
    let output = parse_output(&output, shell, key_sequence)?;

    if check_only {
        let overlaps = controller.check(&keys)?;
        println!("{} {} → {} is valid", "✓".green(), input.cyan(), output);
        print_overlaps(&overlaps);
        print_similar(controller, &KeySet::new(&keys)?, &overlaps)?;
        return Ok(());
    }

    let added = controller.add(&keys, output, category)?;
    let timeout = controller
        .settings()?
        .timing
        .table()
        .timeout_for(added.chord.input_keys.effective_len());

    print!("{} Added ", "✓".green());
    print_chord(&added.chord);
    println!("  {} window", format!("{} ms", timeout).dimmed());
    print_overlaps(&added.warnings);
    print_similar(controller, &added.chord.input_keys, &added.warnings)?;
    Ok(())
}

/// Hints at chords sharing keys with `keys`, skipping those already
/// reported as overlaps
fn print_similar(
    controller: &Controller<KarabinerEngine>,
    keys: &KeySet,
    overlaps: &[Overlap],
) -> anyhow::Result<()> {
    let similar: Vec<Chord> = controller
        .similar(keys)?
        .into_iter()
        .filter(|c| !overlaps.iter().any(|o| o.existing_keys == c.input_keys))
        .take(3)
        .collect();

    if !similar.is_empty() {
        println!("  {} Similar chords:", "ℹ".blue());
        for chord in &similar {
            print!("    ");
            print_chord(chord);
        }
    }
    Ok(())
}

fn add_batch(
    controller: &Controller<KarabinerEngine>,
    path: &str,
    category: Option<String>,
) -> anyhow::Result<()> {
    let path = expand_path(path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let entries = parse_batch_file(&content)?;

    println!("{} Batch add: {} chords", "→".cyan(), entries.len());
    let report = controller.add_batch(&entries, category)?;

    for added in &report.added {
        print!("  {} ", "✓".green());
        print_chord(&added.chord);
        print_overlaps(&added.warnings);
    }
    for (entry, error) in &report.failed {
        println!("  {} line {}: {}", "✗".red(), entry.line, error);
    }

    println!(
        "\n{} Added {} chords{}",
        "✓".green(),
        report.added.len(),
        if report.failed.is_empty() {
            String::new()
        } else {
            format!(", {} failed", report.failed.len()).red().to_string()
        }
    );
    Ok(())
}

fn remove(
    controller: &Controller<KarabinerEngine>,
    input: Option<String>,
    output: Option<String>,
    id: Option<String>,
) -> anyhow::Result<()> {
    let selector = match (input, output, id) {
        (_, _, Some(id)) => ChordSelector::Id(ChordId::from_str(&id)?),
        (Some(input), _, _) => ChordSelector::Keys(KeySet::new(parse_keys(&input)?)?),
        (None, Some(output), None) => ChordSelector::Output(output),
        (None, None, None) => bail!("Give KEYS, --output or --id"),
    };

    let removed = controller.remove(&selector)?;
    print!("{} Removed ", "✓".green());
    print_chord(&removed);
    Ok(())
}

fn edit(
    controller: &Controller<KarabinerEngine>,
    id: &str,
    output: Option<String>,
    category: Option<String>,
    clear_category: bool,
    shell: bool,
    key_sequence: bool,
) -> anyhow::Result<()> {
    let id = ChordId::from_str(id)?;
    let output = output
        .map(|raw| parse_output(&raw, shell, key_sequence))
        .transpose()?;
    let category = if clear_category {
        Some(None)
    } else {
        category.map(Some)
    };

    let edited = controller.edit(&id, output, category)?;
    print!("{} Updated ", "✓".green());
    print_chord(&edited);
    Ok(())
}

fn list(
    controller: &Controller<KarabinerEngine>,
    category: Option<&str>,
    order: ListOrder,
) -> anyhow::Result<()> {
    let chords = controller.list(category, order)?;

    if chords.is_empty() {
        println!("{} No chords", "ℹ".blue());
        return Ok(());
    }

    for chord in &chords {
        print_chord(chord);
    }
    println!("\n{} Total: {} chords", "✓".green(), chords.len());
    Ok(())
}

fn search(
    controller: &Controller<KarabinerEngine>,
    query: &str,
    scope: SearchScope,
) -> anyhow::Result<()> {
    let found = controller.search(query, scope)?;

    if found.is_empty() {
        println!("{} Nothing matches '{}'", "ℹ".blue(), query);
        return Ok(());
    }

    for chord in &found {
        print_chord(chord);
    }
    Ok(())
}

fn undo(controller: &Controller<KarabinerEngine>, count: usize) -> anyhow::Result<()> {
    let undone = controller.undo(count)?;

    if undone.is_empty() {
        println!("{} Nothing to undo", "ℹ".blue());
        return Ok(());
    }

    for chord in &undone {
        print!("{} Undid ", "✓".green());
        print_chord(chord);
    }
    if undone.len() < count {
        println!("{}", format!("Only {} chords in history", undone.len()).yellow());
    }
    Ok(())
}

fn stats(controller: &Controller<KarabinerEngine>, detailed: bool) -> anyhow::Result<()> {
    let stats = controller.stats()?;

    println!("{}", "Chord library".bold());
    println!("  Total chords: {}", stats.total.to_string().cyan());
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("  Oldest chord: {}", oldest.format("%Y-%m-%d"));
        println!("  Newest chord: {}", newest.format("%Y-%m-%d"));
    }

    println!("\n{}", "By key count".bold());
    for (count, chords) in &stats.by_key_count {
        println!("  {}-key: {}", count, chords);
    }

    println!("\n{}", "By category".bold());
    for (category, chords) in &stats.by_category {
        println!("  {}: {}", category.magenta(), chords);
    }
    if stats.uncategorised > 0 {
        println!("  {}: {}", "(none)".dimmed(), stats.uncategorised);
    }

    if !stats.recent.is_empty() {
        println!("\n{}", "Recently added".bold());
        for chord in &stats.recent {
            print!("  ");
            print_chord(chord);
        }
    }

    println!("\n  Total uses: {}", stats.total_usage);

    if detailed {
        let mut by_category: BTreeMap<Option<String>, Vec<Chord>> = BTreeMap::new();
        for chord in controller.list(None, ListOrder::Input)? {
            by_category.entry(chord.category.clone()).or_default().push(chord);
        }

        for (category, chords) in &by_category {
            let name = category.as_deref().unwrap_or("(none)");
            println!("\n{} ({} chords)", name.magenta().bold(), chords.len());
            for chord in chords {
                print!("  ");
                print_chord(chord);
            }
        }
    }
    Ok(())
}

fn config(
    controller: &Controller<KarabinerEngine>,
    show: bool,
    update: &TimingUpdate,
) -> anyhow::Result<()> {
    if !update.is_empty() {
        if let Some(ms) = update.chord_timeout_ms {
            if ms < 50 {
                println!("{} Very low timeouts make chords hard to hit", "⚠".yellow());
            } else if ms > 500 {
                println!("{} High timeouts make typing feel sluggish", "⚠".yellow());
            }
        }

        if controller.set_timing(update)? {
            let chords = controller.stats()?.total;
            println!("{} Timing updated, {} chords republished", "✓".green(), chords);
        } else {
            println!("{} Timing already set", "ℹ".blue());
        }
    } else if !show {
        println!("{} Nothing to change; use --show to see the settings", "ℹ".blue());
        return Ok(());
    }

    if show {
        let settings = controller.settings()?;
        let timing = &settings.timing;
        println!("{}", "Settings".bold());
        println!("  Chord timeout: {} ms", timing.chord_timeout_ms);
        println!(
            "  Windows: 2 keys {} ms, 3 keys {} ms, 4 keys {} ms, 5+ keys {} ms",
            timing.two_keys, timing.three_keys, timing.four_keys, timing.five_plus_keys
        );
        println!("  Minimum chord size: {} keys", settings.capture.min_chord_size);
        println!("  Library: {}", settings.library_path().display());
        println!("  Karabiner profile: {}", settings.engine.profile_name);
        println!(
            "  Capture launcher: {}",
            settings.engine.launcher_key.as_deref().unwrap_or("(none)")
        );
        if !settings.groups.disabled.is_empty() {
            println!("  Disabled groups: {}", settings.groups.disabled.join(", "));
        }
    }
    Ok(())
}

fn backups(controller: &Controller<KarabinerEngine>, restore: Option<&str>) -> anyhow::Result<()> {
    let backups = controller.backups()?;

    let Some(restore) = restore else {
        if backups.is_empty() {
            println!("{} No library backups", "ℹ".blue());
        }
        for backup in &backups {
            println!("  {}", backup.display());
        }
        return Ok(());
    };

    let backup = match restore {
        "latest" => backups
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("No library backups to restore"))?,
        path => expand_path(path),
    };

    let chords = controller.restore_backup(&backup)?;
    println!(
        "{} Restored {} chords from {}",
        "✓".green(),
        chords,
        backup.display()
    );
    Ok(())
}

fn refresh(controller: &Controller<KarabinerEngine>) -> anyhow::Result<()> {
    let rules = controller.refresh()?;

    for group in rules.groups() {
        println!("  {} {}", "•".cyan(), group);
    }
    if rules.skipped() > 0 {
        println!("  {} {} chords in disabled groups", "ℹ".blue(), rules.skipped());
    }
    println!("{} Published {} rules", "✓".green(), rules.len());
    Ok(())
}

fn print_reconcile(report: &ReconcileReport) {
    for chord in &report.added {
        print!("  {} ", "✓".green());
        print_chord(chord);
    }
    for (pending, error) in &report.failed {
        println!("  {} {} → {}: {}", "✗".red(), pending.keys.join("+"), pending.output, error);
    }
    for line in &report.malformed {
        println!("  {} Malformed: {}", "✗".red(), line.dimmed());
    }

    if report.is_empty() {
        println!("{} No quick chords to sync", "ℹ".blue());
    } else {
        println!(
            "{} Synced {} quick chords ({} left queued)",
            "✓".green(),
            report.added.len(),
            report.remaining
        );
    }
}

fn sync(controller: &Controller<KarabinerEngine>, watch: bool) -> anyhow::Result<()> {
    print_reconcile(&controller.sync()?);

    if !watch {
        return Ok(());
    }

    let watcher = CacheWatcher::new(controller.quick_cache().path())?;
    println!(
        "{} Watching {} (Ctrl-C to stop)",
        "→".cyan(),
        controller.quick_cache().path().display()
    );

    loop {
        if watcher.wait_for_change(Duration::from_secs(60)) {
            match controller.sync() {
                Ok(report) if !report.is_empty() => print_reconcile(&report),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Sync failed, will retry on next change"),
            }
        }
    }
}

fn quick(
    settings: &Settings,
    keys: &str,
    output: &str,
    category: Option<&str>,
    mode: EngineMode,
) -> anyhow::Result<()> {
    let keys = parse_keys(keys)?;

    if mode == EngineMode::DryRun {
        println!("{} Would queue {} → {}", "ℹ".blue(), keys.join("+").cyan(), output);
        return Ok(());
    }

    let cache = QuickCache::new(settings.quick_cache_path());
    cache.append(&keys, output, category)?;
    println!("{} Queued {} → {}", "✓".green(), keys.join("+").cyan(), output);
    Ok(())
}

fn groups(
    controller: &Controller<KarabinerEngine>,
    enable: Option<String>,
    disable: Option<String>,
) -> anyhow::Result<()> {
    let change = enable
        .map(|c| (c, true))
        .or_else(|| disable.map(|c| (c, false)));

    if let Some((category, enabled)) = change {
        let verb = if enabled { "enabled" } else { "disabled" };
        if controller.set_group_enabled(&category, enabled)? {
            println!("{} Group '{}' {}", "✓".green(), category.bold(), verb);
        } else {
            println!("{} Group '{}' already {}", "ℹ".blue(), category, verb);
        }
        return Ok(());
    }

    let groups = controller.groups()?;
    if groups.is_empty() {
        println!("{} No chord groups", "ℹ".blue());
    }
    for group in groups {
        let status = if group.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        };
        println!("  {} {} ({} chords)", group.name.magenta().bold(), status, group.chords);
    }
    Ok(())
}

/// Reads event lines on a background thread until the source closes
fn spawn_event_reader(reader: Box<dyn BufRead + Send>, tx: Sender<KeyEvent>) {
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            match KeyEvent::parse_line(&line, Instant::now()) {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring event line"),
            }
        }
    });
}

/// Asks capture questions on the controlling terminal
struct TerminalPrompt {
    input: Box<dyn BufRead>,
}

impl TerminalPrompt {
    fn ask(&mut self, question: &str) -> Option<String> {
        print!("{}", question);
        io::stdout().flush().ok()?;

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl CapturePrompt for TerminalPrompt {
    fn resolve_conflict(&mut self, keys: &KeySet, existing: &Chord) -> ConflictChoice {
        println!("{} {} already types {}", "⚠".yellow(), keys.to_string().cyan(), existing.output);
        match self.ask("Replace it? [y/N] ") {
            Some(answer) if answer.trim().eq_ignore_ascii_case("y") => ConflictChoice::Replace,
            _ => ConflictChoice::Skip,
        }
    }

    fn warn_overlap(&mut self, keys: &KeySet, overlaps: &[Overlap]) {
        println!("{} {} overlaps existing chords:", "⚠".yellow(), keys.to_string().cyan());
        print_overlaps(overlaps);
    }

    fn request_output(&mut self, keys: &KeySet, timeout_ms: u64) -> OutputResponse {
        let question = format!(
            "{} ({} ms) output, '!' prefix for a shell command, empty to cancel: ",
            keys.to_string().cyan().bold(),
            timeout_ms
        );

        match self.ask(&question) {
            Some(answer) if !answer.trim().is_empty() => match answer.strip_prefix('!') {
                Some(command) => OutputResponse::Output(OutputSpec::shell(command.trim())),
                None => OutputResponse::Output(OutputSpec::text(answer)),
            },
            _ => OutputResponse::Cancel,
        }
    }
}

fn capture(controller: &Controller<KarabinerEngine>, events: Option<String>) -> anyhow::Result<()> {
    let (tx, rx) = channel();

    // Answers come from the terminal unless stdin is free for them
    let prompt_input: Box<dyn BufRead> = match &events {
        Some(path) => {
            let path = expand_path(path);
            let file = fs::File::open(&path)
                .with_context(|| format!("Failed to open event source {}", path.display()))?;
            spawn_event_reader(Box::new(BufReader::new(file)), tx);
            Box::new(BufReader::new(io::stdin()))
        }
        None => {
            spawn_event_reader(Box::new(BufReader::new(io::stdin())), tx);
            let tty = fs::File::open("/dev/tty").context("Capture needs a terminal for prompts")?;
            Box::new(BufReader::new(tty))
        }
    };

    let exit_key = controller.settings()?.capture.exit_key;
    println!(
        "{} Capture mode: press chords, '{}' to finish",
        "→".cyan(),
        exit_key.bold()
    );

    let mut prompt = TerminalPrompt { input: prompt_input };
    let summary = controller.capture(&rx, &mut prompt)?;

    for chord in &summary.accepted {
        print!("  {} ", "✓".green());
        print_chord(chord);
    }
    println!(
        "{} Captured {} chords ({} replaced, {} skipped) in {:.1}s",
        "✓".green(),
        summary.accepted.len(),
        summary.replaced.len(),
        summary.skipped,
        summary.duration.as_secs_f64()
    );
    Ok(())
}

