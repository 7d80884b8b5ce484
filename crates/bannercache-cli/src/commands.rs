//! Command dispatch for the `bannercache` binary.

use anyhow::{anyhow, bail, Context, Result};

use bannercache_core::models::{sort_by_schedule, Entry, LoginOutcome, ReleaseDay};
use bannercache_core::sync::LoadOutcome;
use bannercache_core::utils::truncate_string;

use crate::Session;

/// Titles wider than this are shortened in listings
const TITLE_WIDTH: usize = 40;

pub fn print_usage() {
    println!("Usage: bannercache <command> [args]");
    println!();
    println!("Commands:");
    println!("  list [query]                              List banners, optionally filtered by title");
    println!("  add <title> <day> <HH:MM> [current] [total]  Track a new banner");
    println!("  delete <title>                            Stop tracking a banner");
    println!("  episodes <title> <n>                      Set episodes watched");
    println!("  total <title> <n>                         Set total episode count");
    println!("  day <title> <day>                         Set release day (e.g. mon, Friday)");
    println!("  time <title> <HH:MM>                      Set release time");
    println!("  login <username> <password>               Check credentials with the service");
    println!("  status                                    Show connection and pending changes");
    println!("  watch                                     Stay connected and sync until Ctrl-C");
}

pub async fn run(session: &Session, command: &str, args: &[String]) -> Result<()> {
    match command {
        "list" => list(session, args.first().map(String::as_str).unwrap_or("")).await,
        "add" => add(session, args).await,
        "delete" => {
            let title = arg(args, 0, "title")?;
            session.coordinator.delete(title).await?;
            println!("Deleted {:?}", title);
            Ok(())
        }
        "episodes" => {
            let title = arg(args, 0, "title")?;
            let count = parse_count(arg(args, 1, "episode count")?)?;
            session.coordinator.update_current_episodes(title, count).await?;
            println!("{:?}: watched {}", title, count);
            Ok(())
        }
        "total" => {
            let title = arg(args, 0, "title")?;
            let count = parse_count(arg(args, 1, "episode count")?)?;
            session.coordinator.update_total_episodes(title, count).await?;
            println!("{:?}: {} episodes", title, count);
            Ok(())
        }
        "day" => {
            let title = arg(args, 0, "title")?;
            let day = parse_day(arg(args, 1, "release day")?)?;
            session.coordinator.update_release_day(title, day).await?;
            println!("{:?}: releases on {}", title, day);
            Ok(())
        }
        "time" => {
            let title = arg(args, 0, "title")?;
            let time = arg(args, 1, "release time")?;
            session.coordinator.update_release_time(title, time).await?;
            println!("{:?}: releases at {}", title, time);
            Ok(())
        }
        "login" => login(session, args).await,
        "status" => {
            print_status(session);
            Ok(())
        }
        "watch" => watch(session).await,
        other => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument: {}", name))
}

fn parse_count(s: &str) -> Result<u32> {
    s.parse().with_context(|| format!("Invalid episode count {:?}", s))
}

fn parse_day(s: &str) -> Result<ReleaseDay> {
    ReleaseDay::from_name(s).ok_or_else(|| anyhow!("Unknown release day {:?}", s))
}

async fn list(session: &Session, query: &str) -> Result<()> {
    let coordinator = &session.coordinator;
    coordinator.set_query(query);
    loop {
        match coordinator.load_next_page().await? {
            LoadOutcome::Loaded { .. } if !coordinator.pagination().exhausted => continue,
            _ => break,
        }
    }

    let mut entries = coordinator.entries();
    sort_by_schedule(&mut entries);
    if entries.is_empty() {
        println!("No banners found.");
    } else {
        for entry in &entries {
            println!("{}", format_row(entry));
        }
    }
    if !coordinator.is_online() {
        println!("(offline, {} change(s) pending)", coordinator.pending_changes());
    }
    Ok(())
}

fn format_row(entry: &Entry) -> String {
    let done = if entry.is_complete() { "done" } else { "" };
    format!(
        "{:<9} {:>5}  {:<width$}  {:>7} {}",
        entry.release_day.name(),
        entry.release_time,
        truncate_string(&entry.title, TITLE_WIDTH),
        entry.progress_display(),
        done,
        width = TITLE_WIDTH
    )
}

async fn add(session: &Session, args: &[String]) -> Result<()> {
    let title = arg(args, 0, "title")?;
    let day = parse_day(arg(args, 1, "release day")?)?;
    let time = arg(args, 2, "release time")?;
    let current = args.get(3).map(|s| parse_count(s)).transpose()?.unwrap_or(0);
    let total = args.get(4).map(|s| parse_count(s)).transpose()?.unwrap_or(0);

    let entry = Entry::new(title, day, time).with_episodes(current, total);
    session.coordinator.add(entry).await?;
    println!("Added {:?}", title);
    Ok(())
}

async fn login(session: &Session, args: &[String]) -> Result<()> {
    let username = arg(args, 0, "username")?;
    let password = arg(args, 1, "password")?;

    let outcome = session.coordinator.login(username, password).await?;
    if let LoginOutcome::Fail { error } = &outcome {
        bail!("Login failed: {}", error);
    }
    println!("Logged in as {}{}", username, if outcome.is_admin() { " (admin)" } else { "" });

    let mut config = session.config.clone();
    config.last_username = Some(username.to_string());
    config.save()?;
    Ok(())
}

fn print_status(session: &Session) {
    let coordinator = &session.coordinator;
    println!("Server:   {}", session.config.server_url.as_deref().unwrap_or("(none)"));
    println!("State:    {}", coordinator.state());
    println!("Pending:  {} change(s)", coordinator.pending_changes());
    println!("Replay:   {:?}", coordinator.replay_policy());
    if let Some(snapshot) = coordinator.cache_manager().and_then(|m| m.offline_snapshot()) {
        let stale = if snapshot.is_stale() { " (may be out of date)" } else { "" };
        println!("Saved:    {} entries, {}{}", snapshot.data.len(), snapshot.age_display(), stale);
    }
    if let Some(user) = &session.config.last_username {
        println!("User:     {}", user);
    }
}

async fn watch(session: &Session) -> Result<()> {
    println!("Watching connectivity every {}s, Ctrl-C to stop", session.config.poll_interval().as_secs());
    print_status(session);

    let mut changes = session.monitor.subscribe();
    let report = async {
        while changes.changed().await.is_ok() {
            let reachable = *changes.borrow_and_update();
            println!("Service {}", if reachable { "reachable" } else { "unreachable" });
        }
    };

    tokio::select! {
        _ = session.coordinator.run(session.monitor.subscribe(), session.config.poll_interval()) => {}
        _ = report => {}
        signal = tokio::signal::ctrl_c() => signal.context("Failed to listen for Ctrl-C")?,
    }

    print_status(session);
    Ok(())
}
