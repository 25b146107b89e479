use clap::Parser;
use gitlite::config::{IndexConfig, WorkspaceConfig, DEFAULT_BTREE_MIN_DEGREE};
use gitlite::error::{GitLiteError, GitLiteResult};
use gitlite::index::{IndexKind, OrderedIndex};
use gitlite::session::Workspace;
use gitlite::utils::util::pretty_format_rows;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::str::FromStr;

const HELP: &str = "\
init <name> <csv> <AVL|RBTree|BTree> <key-column> [t]
list-repos | switch <name> | delete <name> | current-repo
branch <name> | checkout <name> | branches
insert <key> <f1,f2,...>
update <column> <value> <condition-column> <condition-value>
remove <key> | remove-range <start> <end>
select <key> | select-range <start> <end>
print-tree | root-hash | help | exit";

#[derive(Debug, Parser, PartialEq)]
#[clap(author, version, about, long_about= None)]
struct Args {
    #[clap(long, help = "Directory holding the repositories and their metadata")]
    root: Option<PathBuf>,
    #[clap(long, help = "Default B-tree minimum degree for new repositories")]
    min_degree: Option<usize>,
}

fn expect_args(args: &[&str], count: usize, usage: &str) -> GitLiteResult<()> {
    if args.len() < count {
        return Err(GitLiteError::InvalidArgument(format!("usage: {usage}")));
    }
    Ok(())
}

fn run(workspace: &mut Workspace, default_degree: usize, line: &str) -> GitLiteResult<String> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let Some((command, args)) = tokens.split_first() else {
        return Ok(String::new());
    };

    match *command {
        "help" => Ok(HELP.to_string()),
        "init" => {
            expect_args(args, 4, "init <name> <csv> <kind> <key-column> [t]")?;
            let kind = IndexKind::from_str(args[2]).map_err(|_| {
                GitLiteError::InvalidArgument(format!("unknown tree type '{}'", args[2]))
            })?;
            let degree = match args.get(4) {
                Some(t) => t.parse().map_err(|_| {
                    GitLiteError::InvalidArgument(format!("invalid minimum degree '{t}'"))
                })?,
                None => default_degree,
            };
            let config = IndexConfig::default()
                .with_kind(kind)
                .with_btree_min_degree(degree);
            let repo = workspace.init_repository(args[0], args[1], config, args[3])?;
            Ok(format!(
                "Initialized repository: {} ({} keys)",
                repo.name(),
                repo.index()?.len()
            ))
        }
        "list-repos" => {
            let repos = workspace.list();
            if repos.is_empty() {
                return Ok("No repositories initialized yet.".to_string());
            }
            Ok(repos
                .iter()
                .map(|meta| format!("- {} ({}, {})", meta.name, meta.kind, meta.directory.display()))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "switch" => {
            expect_args(args, 1, "switch <name>")?;
            let repo = workspace.switch(args[0])?;
            Ok(format!("Switched to repository: {}", repo.name()))
        }
        "delete" => {
            expect_args(args, 1, "delete <name>")?;
            workspace.delete_repository(args[0])?;
            Ok(format!("Deleted repository: {}", args[0]))
        }
        "current-repo" => Ok(match workspace.current() {
            Ok(repo) => format!(
                "Current repository: {} (branch {})",
                repo.name(),
                repo.current_branch()
            ),
            Err(_) => "No active repository.".to_string(),
        }),
        "print-tree" => workspace.current()?.print_tree(),
        "root-hash" => Ok(format!("Root hash: {}", workspace.current()?.root_hash()?)),
        "branch" => {
            expect_args(args, 1, "branch <name>")?;
            workspace.current_mut()?.create_branch(args[0])?;
            Ok(format!("Branch '{}' created successfully.", args[0]))
        }
        "checkout" => {
            expect_args(args, 1, "checkout <name>")?;
            workspace.current_mut()?.checkout(args[0])?;
            Ok(format!("Switched to branch '{}'.", args[0]))
        }
        "branches" => {
            let repo = workspace.current()?;
            Ok(repo
                .branches()
                .into_iter()
                .map(|name| {
                    let marker = if name == repo.current_branch() { "*" } else { " " };
                    format!("{marker} {name}")
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "insert" => {
            expect_args(args, 2, "insert <key> <f1,f2,...>")?;
            let row = args[1].split(',').map(str::to_string).collect();
            if workspace.current_mut()?.insert_row(args[0], row)? {
                Ok(format!("Inserted {}.", args[0]))
            } else {
                Ok(format!("Key {} already exists.", args[0]))
            }
        }
        "update" => {
            expect_args(args, 4, "update <column> <value> <condition-column> <condition-value>")?;
            let updated = workspace
                .current_mut()?
                .update(args[0], args[1], args[2], args[3])?;
            Ok(format!("Updated {updated} row(s)."))
        }
        "remove" => {
            expect_args(args, 1, "remove <key>")?;
            if workspace.current_mut()?.delete(args[0])? {
                Ok(format!("Removed {}.", args[0]))
            } else {
                Ok(format!("Key {} not found.", args[0]))
            }
        }
        "remove-range" => {
            expect_args(args, 2, "remove-range <start> <end>")?;
            let removed = workspace.current_mut()?.delete_range(args[0], args[1])?;
            Ok(format!("Removed {removed} key(s)."))
        }
        "select" => {
            expect_args(args, 1, "select <key>")?;
            let repo = workspace.current()?;
            match repo.select(args[0])? {
                Some(row) => Ok(pretty_format_rows(&repo.columns(), &[row]).to_string()),
                None => Ok(format!("Key {} not found.", args[0])),
            }
        }
        "select-range" => {
            expect_args(args, 2, "select-range <start> <end>")?;
            let repo = workspace.current()?;
            let rows = repo.select_range(args[0], args[1])?;
            if rows.is_empty() {
                return Ok("No rows in range.".to_string());
            }
            Ok(pretty_format_rows(&repo.columns(), &rows).to_string())
        }
        other => Err(GitLiteError::InvalidArgument(format!(
            "unknown command '{other}', try 'help'"
        ))),
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = match args.root {
        Some(root) => WorkspaceConfig::new(root),
        None => WorkspaceConfig::default(),
    };
    let default_degree = args.min_degree.unwrap_or(DEFAULT_BTREE_MIN_DEGREE);
    let mut workspace = Workspace::open(config)
        .unwrap_or_else(|e| panic!("fail to open workspace, err: {}", e));

    println!(":) Welcome to gitlite, type 'help' for commands.");
    let mut rl = DefaultEditor::new().expect("created editor");
    rl.load_history(".gitlite_history").ok();

    loop {
        let readline = rl.readline("gitlite> ");
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                let line = line.trim();
                if line == "exit" || line == "\\q" {
                    println!("bye!");
                    break;
                }
                match run(&mut workspace, default_degree, line) {
                    Ok(output) => {
                        if !output.is_empty() {
                            println!("{}", output.trim_end())
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    rl.save_history(".gitlite_history").ok();
}
