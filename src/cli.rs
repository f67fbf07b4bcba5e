//! CLI: stdin/stdout REPL for driving the engine locally.

use std::fmt::Write as _;
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bots::{BotKind, BotPool, BotStatus};
use crate::orders::OrderKind;

pub const HELP: &str = "\
Commands:
  normal | n      new normal order
  vip | v         new VIP order
  + | bot+        add a normal bot
  +vip            add a VIP bot
  - | bot-        remove the newest bot
  status | s      show queues and bots
  help | h        this text
  quit | q        stop all bots and exit";

/// A parsed REPL line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NewOrder(OrderKind),
    AddBot(BotKind),
    RemoveBot,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "n" => Ok(Self::NewOrder(OrderKind::Normal)),
            "vip" | "v" => Ok(Self::NewOrder(OrderKind::Vip)),
            "+" | "bot+" => Ok(Self::AddBot(BotKind::Normal)),
            "+vip" | "bot+vip" => Ok(Self::AddBot(BotKind::Vip)),
            "-" | "bot-" => Ok(Self::RemoveBot),
            "status" | "s" => Ok(Self::Status),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command: {other} (try 'help')")),
        }
    }
}

/// Apply a command to the pool and return the text to print.
///
/// `Quit` is handled by the caller and yields an empty string here.
pub fn execute(pool: &BotPool, command: Command) -> String {
    match command {
        Command::NewOrder(kind) => {
            let order = pool.registry().create_item(kind);
            format!("Created {kind} order #{}", order.id)
        }
        Command::AddBot(kind) => {
            let bot = pool.scale_up(kind);
            match bot.current_order() {
                Some(order) => format!("Added {kind} bot {} (working on #{})", bot.id(), order.id),
                None => format!("Added {kind} bot {} (idle)", bot.id()),
            }
        }
        Command::RemoveBot => match pool.scale_down() {
            Some(bot) => format!("Removed bot {}", bot.id()),
            None => "No bots to remove".to_string(),
        },
        Command::Status => render_status(pool),
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    }
}

/// Plain-text view of queues, bots and completed orders.
pub fn render_status(pool: &BotPool) -> String {
    let registry = pool.registry();
    let stats = registry.stats();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "PENDING ({} queued: {} recovery, {} vip, {} normal)",
        stats.recovery + stats.vip + stats.normal,
        stats.recovery,
        stats.vip,
        stats.normal
    );
    for order in registry.pending() {
        let _ = writeln!(out, "  #{} {}", order.id, order.kind);
    }

    let bots = pool.list_workers();
    let _ = writeln!(out, "BOTS ({})", bots.len());
    for bot in &bots {
        let snapshot = bot.snapshot();
        match (snapshot.status, snapshot.order_id, snapshot.remaining_ticks) {
            (BotStatus::Running, Some(order_id), Some(ticks)) => {
                let _ = writeln!(
                    out,
                    "  bot {} [{}] running #{} ({} ticks left)",
                    snapshot.id, snapshot.kind, order_id, ticks
                );
            }
            (status, _, _) => {
                let _ = writeln!(out, "  bot {} [{}] {}", snapshot.id, snapshot.kind, status);
            }
        }
    }

    let completed = registry.completed();
    let _ = write!(out, "COMPLETE ({})", completed.len());
    for order in completed {
        let _ = write!(out, "\n  #{} {}", order.id, order.kind);
    }
    out
}

/// Read commands from stdin until EOF or `quit`.
pub async fn run_repl(pool: &BotPool) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            eprint!("> ");
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => println!("{}", execute(pool, command)),
            Err(e) => eprintln!("{e}"),
        }
        eprint!("> ");
    }

    Ok(())
}
