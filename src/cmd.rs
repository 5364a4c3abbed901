//! Command implementations for the CLI interface.
//!
//! Every handler works on an already refreshed `Session`. Failures that stop
//! a command are printed to stderr and end the process with status 1;
//! failures of background syncs are reported by `finish`.

use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde_json::Value;

use planet_board::api::Router;
use planet_board::board::{available_dependencies, BoardStats, TaskFilter};
use planet_board::coordinator::{MutationState, PendingMutation};
use planet_board::error::SyncError;
use planet_board::fields::{format_priority, Priority, Status};
use planet_board::project::{Project, ProjectDraft, ProjectPatch};
use planet_board::reducer::DropTarget;
use planet_board::session::Session;
use planet_board::task::{Task, TaskDraft, TaskPatch};

#[derive(Subcommand)]
pub enum Commands {
    /// Check the credentials and print the user id.
    Login,

    /// List projects, newest first.
    Projects,

    /// Create a project, optionally seeding tasks from an outline document.
    Launch {
        title: String,
        /// Software | Business | Design | Marketing | Finance | General.
        #[arg(long)]
        category: Option<String>,
        /// Visual size, 1-10.
        #[arg(long)]
        scale: Option<i64>,
        /// Explicit colour, e.g. "#7C3AED".
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Markdown outline to extract a summary and tasks from.
        #[arg(long)]
        doc: Option<PathBuf>,
    },

    /// Inspect or change one project.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Show a project's board: four columns and progress.
    Board {
        /// Project id, id prefix or title.
        project: String,
        /// Case-insensitive text in content, description or tags.
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum)]
        status: Vec<Status>,
        #[arg(long, value_enum)]
        priority: Vec<Priority>,
        #[arg(long)]
        assignee: Vec<String>,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Only tasks with dependencies.
        #[arg(long, conflicts_with = "no_deps")]
        has_deps: bool,
        /// Only tasks without dependencies.
        #[arg(long)]
        no_deps: bool,
        /// Only tasks due now or earlier.
        #[arg(long)]
        overdue: bool,
    },

    /// Add a task at the end of a column.
    Add {
        project: String,
        content: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum, default_value_t = Status::Todo)]
        status: Status,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", or "in Nd".
        #[arg(long)]
        due: Option<String>,
        /// Comma-separated tags. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Prerequisite task id or title. May be repeated.
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        #[arg(long)]
        assignee: Option<String>,
        /// Estimated hours.
        #[arg(long)]
        estimate: Option<f64>,
    },

    /// Move a task to the end of another column.
    Move {
        project: String,
        task: String,
        #[arg(value_enum)]
        column: Status,
    },

    /// Drop a task onto another card, taking its place and column.
    Drop {
        project: String,
        task: String,
        onto: String,
    },

    /// Edit task fields. Status and order change with move/drop.
    Edit {
        project: String,
        task: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum, conflicts_with = "clear_priority")]
        priority: Option<Priority>,
        #[arg(long)]
        clear_priority: bool,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long = "add-tag")]
        add_tags: Vec<String>,
        #[arg(long = "rm-tag")]
        rm_tags: Vec<String>,
        /// Replace the prerequisites. May be repeated.
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        /// Remove every prerequisite.
        #[arg(long, conflicts_with = "depends_on")]
        clear_deps: bool,
        #[arg(long)]
        estimate: Option<f64>,
        #[arg(long)]
        actual: Option<f64>,
    },

    /// Delete a task.
    Rm {
        project: String,
        task: String,
    },

    /// Show prerequisites, dependents and whether a task can start.
    Deps {
        project: String,
        task: String,
    },

    /// Send one request through the JSON endpoint layer and print the reply.
    Request {
        /// GET | POST | PATCH | DELETE.
        method: String,
        /// e.g. "/projects?uid=demo_user".
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Project details and progress.
    Show { project: String },
    /// Set or clear the explicit colour.
    Color {
        project: String,
        #[arg(required_unless_present = "clear")]
        color: Option<String>,
        /// Fall back to the category colour.
        #[arg(long)]
        clear: bool,
    },
    Rename { project: String, title: String },
    /// Delete a project and all of its tasks.
    Delete { project: String },
}

/// Print an error and end the process.
fn die(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

/// Run one command against the session.
pub async fn run(session: &mut Session, command: Commands) {
    match command {
        Commands::Login => println!("Logged in as {}", session.identity().user_id()),
        Commands::Projects => cmd_projects(session),
        Commands::Launch { title, category, scale, color, summary, doc } => {
            cmd_launch(session, title, category, scale, color, summary, doc).await
        }
        Commands::Project { action } => cmd_project(session, action).await,
        Commands::Board { project, search, status, priority, assignee, tags, has_deps, no_deps, overdue } => {
            let filter = TaskFilter {
                search,
                statuses: status,
                priorities: priority,
                assignees: assignee,
                tags: split_tags(&tags),
                has_dependencies: match (has_deps, no_deps) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                overdue,
            };
            cmd_board(session, &project, &filter).await
        }
        Commands::Add { project, content, desc, status, priority, due, tags, depends_on, assignee, estimate } => {
            let mut draft = TaskDraft::new(content);
            draft.description = desc.unwrap_or_default();
            draft.status = status;
            draft.priority = priority;
            draft.due_date = due.as_deref().map(parse_due);
            draft.tags = split_tags(&tags);
            draft.assignee = assignee;
            draft.estimated_hours = estimate;
            cmd_add(session, &project, draft, &depends_on).await
        }
        Commands::Move { project, task, column } => {
            cmd_move(session, &project, &task, MoveTo::Column(column)).await
        }
        Commands::Drop { project, task, onto } => cmd_move(session, &project, &task, MoveTo::Card(onto)).await,
        Commands::Edit {
            project, task, content, desc, priority, clear_priority, due, clear_due, assignee,
            add_tags, rm_tags, depends_on, clear_deps, estimate, actual,
        } => {
            let patch = TaskPatch {
                content,
                description: desc,
                priority: if clear_priority { Some(None) } else { priority.map(Some) },
                due_date: if clear_due { Some(None) } else { due.as_deref().map(|d| Some(parse_due(d))) },
                assignee: assignee.map(|a| Some(a).filter(|a| !a.trim().is_empty())),
                estimated_hours: estimate.map(Some),
                actual_hours: actual.map(Some),
                dependencies: clear_deps.then(Vec::new),
                ..TaskPatch::default()
            };
            let edits = TaskEdits { add_tags: split_tags(&add_tags), rm_tags: split_tags(&rm_tags), depends_on };
            cmd_edit(session, &project, &task, patch, edits).await
        }
        Commands::Rm { project, task } => cmd_rm(session, &project, &task).await,
        Commands::Deps { project, task } => cmd_deps(session, &project, &task).await,
        Commands::Request { method, path, body } => cmd_request(session, &method, &path, body).await,
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Wait for background syncs, write queued project edits, end the session
/// and report anything that failed along the way.
pub async fn finish(session: Session) {
    session.settle().await;
    let mut failed = false;
    match session.flush().await {
        Ok(report) => {
            for (project, message) in report.failed {
                eprintln!("Saving project {}: {}", short_id(&project), message);
                failed = true;
            }
        }
        Err(e) => {
            eprintln!("Saving projects: {}", e.user_message());
            failed = true;
        }
    }
    for notice in session.teardown() {
        eprintln!("{:?} of task {} failed: {}", notice.kind, short_id(&notice.task_id), notice.message);
        tracing::debug!("{}", notice.detail);
        failed = true;
    }
    if failed {
        std::process::exit(1);
    }
}

/// List all projects of the logged-in user.
pub fn cmd_projects(session: &Session) {
    let projects = session.registry().list();
    if projects.is_empty() {
        println!("No projects yet. Create one with `planet launch <title>`.");
        return;
    }
    println!("{:<10} {:<24} {:<12} {:<5} {:<8} {}", "ID", "Title", "Category", "Scale", "Color", "Created");
    for p in projects {
        println!(
            "{:<10} {:<24} {:<12} {:<5} {:<8} {}",
            short_id(&p.id),
            truncate(&p.title, 24),
            truncate(&p.category, 12),
            p.scale,
            p.display_color(),
            p.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }
}

pub async fn cmd_launch(
    session: &mut Session,
    title: String,
    category: Option<String>,
    scale: Option<i64>,
    color: Option<String>,
    summary: Option<String>,
    doc: Option<PathBuf>,
) {
    let document_text = match doc {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => die(&format!("Failed to read {}", path.display()), e),
        },
        None => None,
    };
    let draft = ProjectDraft {
        title,
        category,
        scale,
        color,
        summary: summary.unwrap_or_default(),
        document_text,
        ..ProjectDraft::default()
    };
    match session.launch_project(draft).await {
        Ok(launch) => {
            println!("Launched project {} ({})", launch.project.title, short_id(&launch.project.id));
            if launch.tasks_created > 0 || launch.tasks_skipped > 0 {
                println!("Seeded {} tasks ({} skipped)", launch.tasks_created, launch.tasks_skipped);
            }
        }
        Err(e) => die("Launch failed", e.user_message()),
    }
}

pub async fn cmd_project(session: &mut Session, action: ProjectAction) {
    match action {
        ProjectAction::Show { project } => {
            let project = open(session, &project).await;
            print_project(&project);
            let board = session.board(&project.id, &TaskFilter::default());
            print_stats(&board.stats);
        }
        ProjectAction::Color { project, color, clear } => {
            let project = open(session, &project).await;
            let color = if clear { None } else { color };
            apply_project_patch(session, &project, ProjectPatch::color(color));
        }
        ProjectAction::Rename { project, title } => {
            let project = open(session, &project).await;
            apply_project_patch(session, &project, ProjectPatch::title(title));
        }
        ProjectAction::Delete { project } => {
            let project = resolve_project(session, &project);
            match session.delete_project(&project.id).await {
                Ok(n) => println!("Deleted project {} and {} tasks", project.title, n),
                Err(e) => die("Delete failed", e.user_message()),
            }
        }
    }
}

fn apply_project_patch(session: &mut Session, project: &Project, patch: ProjectPatch) {
    match session.patch_project(&project.id, patch) {
        Ok(true) => println!("Updated project {}", short_id(&project.id)),
        Ok(false) => println!("No changes"),
        Err(e) => die("Update failed", e.user_message()),
    }
}

pub async fn cmd_board(session: &mut Session, project: &str, filter: &TaskFilter) {
    let project = open(session, project).await;
    let board = session.board(&project.id, filter);
    println!("{} [{}]", project.title, project.display_color());
    if !filter.is_empty() {
        println!("({} filters active)", filter.active_count());
    }
    let today = Local::now().date_naive();
    for (status, tasks) in board.columns.iter() {
        println!();
        println!("== {} ({}) ==", status.title(), tasks.len());
        for t in tasks {
            print_card(t, today);
        }
    }
    println!();
    print_stats(&board.stats);
}

pub async fn cmd_add(session: &mut Session, project: &str, mut draft: TaskDraft, depends_on: &[String]) {
    let project = open(session, project).await;
    draft.project_id = Some(project.id.clone());
    draft.dependencies = resolve_tasks(session, &project.id, depends_on);
    match session.coordinator().create_task(draft) {
        Ok(pending) => report("Added task", pending).await,
        Err(e) => die("Add failed", e.user_message()),
    }
}

pub enum MoveTo {
    Column(Status),
    Card(String),
}

pub async fn cmd_move(session: &mut Session, project: &str, task: &str, to: MoveTo) {
    let project = open(session, project).await;
    let task = resolve_task(session, &project.id, task);
    let target = match to {
        MoveTo::Column(status) => DropTarget::Column(status),
        MoveTo::Card(onto) => DropTarget::Task(resolve_task(session, &project.id, &onto).id),
    };
    match session.coordinator().move_task(&project.id, &task.id, &target) {
        Some(pending) => report("Moved task", pending).await,
        None => println!("Nothing to move"),
    }
}

/// Edits that need the task's current values or other tasks to resolve.
pub struct TaskEdits {
    pub add_tags: Vec<String>,
    pub rm_tags: Vec<String>,
    pub depends_on: Vec<String>,
}

pub async fn cmd_edit(session: &mut Session, project: &str, task: &str, mut patch: TaskPatch, edits: TaskEdits) {
    let project = open(session, project).await;
    let task = resolve_task(session, &project.id, task);
    if !edits.add_tags.is_empty() || !edits.rm_tags.is_empty() {
        let mut tags = task.tags.clone();
        tags.extend(edits.add_tags);
        tags.retain(|t| !edits.rm_tags.contains(t));
        tags.sort();
        tags.dedup();
        patch.tags = Some(tags);
    }
    if !edits.depends_on.is_empty() {
        patch.dependencies = Some(resolve_tasks(session, &project.id, &edits.depends_on));
    }
    match session.coordinator().edit_task(&project.id, &task.id, patch) {
        Ok(Some(pending)) => report("Updated task", pending).await,
        Ok(None) => println!("No changes"),
        Err(e) => die("Edit failed", e.user_message()),
    }
}

pub async fn cmd_rm(session: &mut Session, project: &str, task: &str) {
    let project = open(session, project).await;
    let task = resolve_task(session, &project.id, task);
    match session.coordinator().delete_task(&project.id, &task.id) {
        Some(pending) => report("Deleted task", pending).await,
        None => println!("Nothing to delete"),
    }
}

pub async fn cmd_deps(session: &mut Session, project: &str, task: &str) {
    let project = open(session, project).await;
    let task = resolve_task(session, &project.id, task);
    let deps = match session.dependencies(&project.id, &task.id) {
        Ok(r) => r,
        Err(e) => die("Dependencies", e.user_message()),
    };
    let all = session.tasks(&project.id);

    println!("{} ({})", task.content, short_id(&task.id));
    println!("Can start: {}", if deps.can_start { "yes" } else { "no" });
    if deps.links.is_empty() && deps.dangling.is_empty() {
        println!("No prerequisites");
    }
    for link in &deps.links {
        let mark = if link.circular {
            "circular"
        } else if link.is_blocking() {
            "blocking"
        } else {
            "done"
        };
        println!("  [{:<8}] {} {} ({})", mark, short_id(&link.id), link.content, link.status.title());
    }
    for id in &deps.dangling {
        println!("  [missing ] {}", short_id(id));
    }
    if deps.has_circular() {
        println!("Warning: circular dependencies are ignored when deciding whether a task can start");
    }
    if !deps.dependents.is_empty() {
        println!("Needed by:");
        for id in &deps.dependents {
            let name = all.iter().find(|t| t.id == *id).map_or("", |t| t.content.as_str());
            println!("  {} {}", short_id(id), name);
        }
    }
    println!("{} other tasks could be added as prerequisites", available_dependencies(&task, &all).len());
}

pub async fn cmd_request(session: &mut Session, method: &str, path: &str, body: Option<String>) {
    let method = match method.to_uppercase().parse::<http::Method>() {
        Ok(m) => m,
        Err(e) => die("Invalid method", e),
    };
    let body: Value = match body.as_deref().map(serde_json::from_str::<Value>).transpose() {
        Ok(b) => b.unwrap_or(Value::Null),
        Err(e) => die("Invalid JSON body", e),
    };
    let request = match http::Request::builder().method(method).uri(path).body(body) {
        Ok(r) => r,
        Err(e) => die("Invalid request", e),
    };
    let response = Router::new(session.gateway().clone()).handle(request).await;
    let status = response.status();
    match serde_json::to_string_pretty(response.body()) {
        Ok(text) => println!("{text}"),
        Err(e) => die("Failed to render response", e),
    }
    if !status.is_success() {
        eprintln!("HTTP {status}");
        std::process::exit(1);
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

async fn open(session: &mut Session, identifier: &str) -> Project {
    match session.open_project(identifier).await {
        Ok(p) => p,
        Err(e) => die("Cannot open project", message(&e)),
    }
}

fn resolve_project(session: &Session, identifier: &str) -> Project {
    match session.registry().resolve(identifier) {
        Ok(p) => p.clone(),
        Err(e) => die("Cannot find project", message(&e)),
    }
}

fn resolve_task(session: &Session, project_id: &str, identifier: &str) -> Task {
    match session.resolve_task(project_id, identifier) {
        Ok(t) => t,
        Err(e) => die("Cannot find task", message(&e)),
    }
}

fn resolve_tasks(session: &Session, project_id: &str, identifiers: &[String]) -> Vec<String> {
    identifiers.iter().map(|i| resolve_task(session, project_id, i).id).collect()
}

/// Lookup failures are worth showing verbatim; store failures are not.
fn message(err: &SyncError) -> String {
    match err {
        SyncError::NotFound(msg) => msg.clone(),
        other => other.user_message(),
    }
}

/// Wait for one mutation and say how it went.
async fn report(done: &str, pending: PendingMutation) {
    let id = pending.task_id.clone();
    match pending.settled().await {
        MutationState::Confirmed => println!("{done} {}", short_id(&id)),
        MutationState::RolledBack => println!("{done} {} locally, but the store refused it and it was undone", short_id(&id)),
        state => tracing::debug!("Mutation on {} ended as {:?}", id, state),
    }
}

fn print_project(p: &Project) {
    println!("ID:       {}", p.id);
    println!("Title:    {}", p.title);
    println!("Category: {}", p.category);
    println!("Scale:    {}", p.scale);
    println!("Color:    {}", p.display_color());
    println!("Created:  {}", p.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    if !p.summary.is_empty() {
        println!("Summary:  {}", p.summary);
    }
}

fn print_card(t: &Task, today: NaiveDate) {
    let tags = if t.tags.is_empty() { String::new() } else { format!(" [{}]", t.tags.join(",")) };
    let deps = if t.dependencies.is_empty() { String::new() } else { format!(" (needs {})", t.dependencies.len()) };
    println!(
        "  {:<10} {:<7} {:<9} {}{}{}",
        short_id(&t.id),
        format_priority(t.priority),
        format_due_relative(t.due_date, today),
        truncate(&t.content, 48),
        tags,
        deps
    );
}

fn print_stats(stats: &BoardStats) {
    println!("Progress: {}% ({}/{} done)", stats.progress, stats.completed, stats.total);
    let shares: Vec<String> = stats
        .breakdown
        .iter()
        .map(|s| format!("{} {} ({}%)", s.status.title(), s.count, s.percentage))
        .collect();
    println!("{}", shares.join(" | "));
    if stats.estimated_hours > 0.0 || stats.actual_hours > 0.0 {
        println!("Hours: {:.1} estimated, {:.1} spent", stats.estimated_hours, stats.actual_hours);
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncate to `width` characters, ending in an ellipsis when cut.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Split repeated, comma-separated tag arguments; trimmed, lowercased, unique.
pub fn split_tags(inputs: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = inputs
        .iter()
        .flat_map(|raw| raw.split(','))
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Parse "today", "tomorrow", "in Nd" or YYYY-MM-DD into the end of that
/// local day. Anything else ends the process.
pub fn parse_due(input: &str) -> DateTime<Utc> {
    match parse_due_date(input, Local::now().date_naive()) {
        Some(date) => end_of_day(date),
        None => die("Invalid due date", format!("'{input}' (use YYYY-MM-DD, today, tomorrow or in Nd)")),
    }
}

fn parse_due_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = input.trim().to_lowercase();
    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        _ => {}
    }
    if let Some(n) = s.strip_prefix("in ").and_then(|r| r.strip_suffix('d')) {
        let days = n.trim().parse::<i64>().ok().and_then(TimeDelta::try_days)?;
        return today.checked_add_signed(days);
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .and_then(|dt| Local.from_local_datetime(&dt).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// "today", "tomorrow", "in 3d", "2d late" or "-".
pub fn format_due_relative(due: Option<DateTime<Utc>>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let days = (d.with_timezone(&Local).date_naive() - today).num_days();
            match days {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {n}d"),
                n => format!("{}d late", -n),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }

    #[test]
    fn test_split_tags_normalises() {
        let tags = split_tags(&["Backend, api".into(), "api".into(), " ".into()]);
        assert_eq!(tags, vec!["api".to_string(), "backend".to_string()]);
    }

    #[test]
    fn test_parse_due_date_forms() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(parse_due_date("today", today), Some(today));
        assert_eq!(parse_due_date("Tomorrow", today), NaiveDate::from_ymd_opt(2026, 3, 11));
        assert_eq!(parse_due_date("in 5d", today), NaiveDate::from_ymd_opt(2026, 3, 15));
        assert_eq!(parse_due_date("2026-04-01", today), NaiveDate::from_ymd_opt(2026, 4, 1));
        assert_eq!(parse_due_date("someday", today), None);
        assert_eq!(parse_due_date("in 9999999999999d", today), None);
        assert_eq!(parse_due_date("in 99999999d", today), None);
    }

    #[test]
    fn test_format_due_relative() {
        let today = Local::now().date_naive();
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(end_of_day(today)), today), "today");
        assert_eq!(format_due_relative(Some(end_of_day(today + TimeDelta::days(4))), today), "in 4d");
        assert_eq!(format_due_relative(Some(end_of_day(today - TimeDelta::days(2))), today), "2d late");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
