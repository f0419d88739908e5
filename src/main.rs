use anyhow::Result;
use biogit::areas::repository::Repository;
use biogit::commands::porcelain::diff::DiffOptions;
use biogit::commands::porcelain::merge::MergeOutcome;
use biogit::commands::porcelain::push::PushOutcome;
use biogit::remote::client::{RemoteClient, parse_host_port};
use biogit::server::ServerConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Default server address for register/login outside any repository config
const DEFAULT_SERVER_ADDR: &str = "localhost:10088";

/// Exit code for "not a repository" (the other failures exit 1)
const EXIT_NOT_A_REPOSITORY: u8 = 128;

#[derive(Debug, thiserror::Error)]
#[error("not a biogit repository (or any of the parent directories)")]
struct NotARepository;

#[derive(Parser)]
#[command(
    name = "biogit",
    version = "0.1.0",
    about = "A self-hosted git-in-spirit version control system",
    long_about = "biogit keeps local version history in a content-addressed object store \
    and exchanges commits with a biogit server over a custom TCP protocol.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize a new repository")]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(about = "Add files or directories to the index")]
    Add {
        #[arg(index = 1, required = true, help = "The files or directories to stage")]
        paths: Vec<PathBuf>,
    },
    #[command(about = "Remove a file from the index and the working tree")]
    Rm {
        #[arg(index = 1)]
        path: PathBuf,
    },
    #[command(name = "rm-cached", about = "Remove a file from the index only")]
    RmCached {
        #[arg(index = 1)]
        path: PathBuf,
    },
    #[command(about = "Record the staged snapshot as a new commit")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
    },
    #[command(about = "Show the working tree status")]
    Status,
    #[command(about = "Show the commit history of the current branch")]
    Log,
    #[command(about = "Pretty-print an object by hash prefix")]
    Show {
        #[arg(index = 1, help = "A unique object hash prefix (6 to 40 hex chars)")]
        prefix: String,
    },
    #[command(about = "List, create or delete branches")]
    Branch {
        #[arg(index = 1, help = "Name of the branch to create")]
        name: Option<String>,
        #[arg(index = 2, help = "Start point (defaults to HEAD)")]
        start: Option<String>,
        #[arg(short = 'd', long = "delete", help = "Delete the named branch")]
        delete: Option<String>,
        #[arg(short = 'D', help = "Force-delete the named branch")]
        force_delete: Option<String>,
    },
    #[command(about = "Switch to a branch or commit")]
    Switch {
        #[arg(index = 1)]
        target: String,
    },
    #[command(about = "List, create or delete lightweight tags")]
    Tag {
        #[arg(index = 1, help = "Name of the tag to create")]
        name: Option<String>,
        #[arg(index = 2, help = "Commit the tag points at (defaults to HEAD)")]
        target: Option<String>,
        #[arg(short = 'd', long = "delete", help = "Delete the named tag")]
        delete: Option<String>,
    },
    #[command(about = "Show changes between commits, index and working tree")]
    Diff {
        #[arg(long, help = "Compare the index against HEAD")]
        staged: bool,
        #[arg(
            index = 1,
            help = "Two commits followed by paths, or just paths",
            trailing_var_arg = true
        )]
        args: Vec<String>,
    },
    #[command(about = "Merge a branch into the current branch")]
    Merge {
        #[arg(index = 1)]
        target: String,
    },
    #[command(about = "Get or set repository configuration")]
    Config {
        #[arg(index = 1)]
        key: Option<String>,
        #[arg(index = 2)]
        value: Option<String>,
        #[arg(long = "list", help = "List every configured key")]
        list: bool,
    },
    #[command(about = "Clone a remote repository into a new directory")]
    Clone {
        #[arg(index = 1, help = "Remote url: host:port/path")]
        url: String,
        #[arg(index = 2, help = "Target directory (defaults to the repo name)")]
        directory: Option<PathBuf>,
    },
    #[command(about = "Manage remotes")]
    Remote {
        #[command(subcommand)]
        action: Option<RemoteAction>,
        #[arg(short = 'v', help = "Show urls next to remote names")]
        verbose: bool,
    },
    #[command(about = "Download objects and refs from a remote")]
    Fetch {
        #[arg(index = 1)]
        remote: String,
        #[arg(index = 2, help = "Fetch a single ref instead of everything")]
        ref_name: Option<String>,
    },
    #[command(about = "Push a local branch to a remote")]
    Push {
        #[arg(index = 1)]
        remote: String,
        #[arg(index = 2, help = "local-ref[:remote-ref]")]
        refspec: String,
        #[arg(long, help = "Allow a non-fast-forward update")]
        force: bool,
    },
    #[command(about = "Fetch a remote branch and merge it")]
    Pull {
        #[arg(index = 1)]
        remote: String,
        #[arg(index = 2, help = "Remote branch (defaults to main)")]
        branch: Option<String>,
    },
    #[command(about = "Register a user on a biogit server")]
    Register {
        #[arg(index = 1)]
        username: String,
        #[arg(index = 2)]
        password: String,
        #[arg(long, default_value = DEFAULT_SERVER_ADDR, help = "Server address host:port")]
        server: String,
    },
    #[command(about = "Log in to a biogit server and cache the token")]
    Login {
        #[arg(index = 1)]
        username: String,
        #[arg(index = 2)]
        password: String,
        #[arg(long, default_value = DEFAULT_SERVER_ADDR, help = "Server address host:port")]
        server: String,
    },
    #[command(about = "Run a biogit server")]
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
}

#[derive(Subcommand)]
enum RemoteAction {
    #[command(about = "Add a remote")]
    Add {
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2, help = "Remote url: host:port/path")]
        url: String,
    },
    #[command(about = "Remove a remote")]
    Remove {
        #[arg(index = 1)]
        name: String,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    #[command(about = "Start serving repositories below a root directory")]
    Start {
        #[arg(index = 1)]
        port: u16,
        #[arg(index = 2)]
        repo_root: PathBuf,
        #[arg(index = 3, help = "Secret used to sign session tokens")]
        token_secret: String,
        #[arg(index = 4, help = "Log directory (defaults to <repo-root>/logs)")]
        log_dir: Option<PathBuf>,
        #[arg(index = 5, help = "Log file name prefix")]
        log_name: Option<String>,
    },
}

/// Load the repository enclosing the current directory
fn load_repository() -> Result<Repository> {
    let cwd = std::env::current_dir()?;
    let root = Repository::find_root(&cwd).ok_or(NotARepository)?;
    Repository::load(&root)
}

/// Cached token for the enclosing repository, required by remote commands
fn require_token(repository: &Repository) -> Result<String> {
    repository
        .read_cached_token()
        .ok_or_else(|| anyhow::anyhow!("not logged in; run 'biogit login <user> <pass>' first"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {:#}", "error:".red().bold(), error);
            if error.is::<NotARepository>() {
                ExitCode::from(EXIT_NOT_A_REPOSITORY)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Init { path } => {
            let target = match path {
                Some(path) => PathBuf::from(path),
                None => std::env::current_dir()?,
            };
            let repository = Repository::init(&target)?;
            println!(
                "Initialized empty biogit repository in {}",
                repository.biogit_dir().display()
            );
        }
        Commands::Add { paths } => {
            let mut repository = load_repository()?;
            repository.add(&paths)?;
        }
        Commands::Rm { path } => {
            let mut repository = load_repository()?;
            repository.rm(&path)?;
        }
        Commands::RmCached { path } => {
            let mut repository = load_repository()?;
            repository.rm_cached(&path)?;
        }
        Commands::Commit { message } => {
            let mut repository = load_repository()?;
            let oid = repository.commit(&message)?;
            println!("[{}] {}", oid.to_short_oid(), message.lines().next().unwrap_or(""));
        }
        Commands::Status => {
            let repository = load_repository()?;
            print!("{}", repository.status()?.render());
        }
        Commands::Log => {
            let repository = load_repository()?;
            for entry in repository.log()? {
                println!("{}", entry.render());
            }
        }
        Commands::Show { prefix } => {
            let repository = load_repository()?;
            println!("{}", repository.show(&prefix)?);
        }
        Commands::Branch {
            name,
            start,
            delete,
            force_delete,
        } => {
            let repository = load_repository()?;
            if let Some(name) = delete {
                repository.branch_delete(&name, false)?;
                println!("Deleted branch {}", name);
            } else if let Some(name) = force_delete {
                repository.branch_delete(&name, true)?;
                println!("Deleted branch {}", name);
            } else if let Some(name) = name {
                repository.branch_create(&name, start.as_deref())?;
            } else {
                let (branches, current) = repository.branch_list()?;
                for (branch, _) in branches {
                    if Some(&branch) == current.as_ref() {
                        println!("* {}", branch.green());
                    } else {
                        println!("  {}", branch);
                    }
                }
            }
        }
        Commands::Switch { target } => {
            let mut repository = load_repository()?;
            repository.switch(&target)?;
            println!("Switched to '{}'", target);
        }
        Commands::Tag {
            name,
            target,
            delete,
        } => {
            let repository = load_repository()?;
            if let Some(name) = delete {
                repository.tag_delete(&name)?;
                println!("Deleted tag {}", name);
            } else if let Some(name) = name {
                repository.tag_create(&name, target.as_deref())?;
            } else {
                for (tag, _) in repository.tag_list()? {
                    println!("{}", tag);
                }
            }
        }
        Commands::Diff { staged, args } => {
            let repository = load_repository()?;
            let options = if !staged && args.len() >= 2 {
                DiffOptions {
                    staged: false,
                    commit1: Some(args[0].clone()),
                    commit2: Some(args[1].clone()),
                    paths: args[2..].iter().map(PathBuf::from).collect(),
                }
            } else {
                DiffOptions {
                    staged,
                    commit1: None,
                    commit2: None,
                    paths: args.iter().map(PathBuf::from).collect(),
                }
            };
            print!("{}", repository.diff(&options)?);
        }
        Commands::Merge { target } => {
            let mut repository = load_repository()?;
            match repository.merge(&target)? {
                MergeOutcome::AlreadyUpToDate => println!("Already up to date."),
                MergeOutcome::FastForward(oid) => {
                    println!("Fast-forward to {}", oid.to_short_oid());
                }
                MergeOutcome::Merged(oid) => {
                    println!("Merge made commit {}", oid.to_short_oid());
                }
                MergeOutcome::Conflicts(paths) => {
                    for path in &paths {
                        println!("CONFLICT (content): {}", path.display());
                    }
                    anyhow::bail!("automatic merge failed; fix conflicts and commit the result");
                }
            }
        }
        Commands::Config { key, value, list } => {
            let mut repository = load_repository()?;
            if list {
                for (key, value) in repository.config().all() {
                    println!("{}={}", key, value);
                }
            } else if let Some(key) = key {
                match value {
                    Some(value) => {
                        repository.config_mut().set(key, value);
                        repository.config().save()?;
                    }
                    None => match repository.config().get(&key) {
                        Some(value) => println!("{}", value),
                        None => anyhow::bail!("key '{}' is not set", key),
                    },
                }
            } else {
                anyhow::bail!("usage: biogit config <key> [<value>] | biogit config --list");
            }
        }
        Commands::Clone { url, directory } => {
            let target = match directory {
                Some(directory) => directory,
                None => {
                    // default directory: last component of the repo path
                    let parsed = biogit::remote::client::RemoteUrl::parse(&url)?;
                    PathBuf::from(
                        parsed
                            .repo_path
                            .rsplit('/')
                            .next()
                            .unwrap_or(parsed.repo_path.as_str()),
                    )
                }
            };
            Repository::clone(&url, &target)?;
            println!("Cloned into '{}'", target.display());
        }
        Commands::Remote { action, verbose } => {
            let mut repository = load_repository()?;
            match action {
                Some(RemoteAction::Add { name, url }) => repository.remote_add(&name, &url)?,
                Some(RemoteAction::Remove { name }) => repository.remote_remove(&name)?,
                None => {
                    for (name, url, fetch) in repository.remote_list() {
                        if verbose {
                            println!("{}\t{} (fetch)", name, fetch);
                            println!("{}\t{} (push)", name, url);
                        } else {
                            println!("{}", name);
                        }
                    }
                }
            }
        }
        Commands::Fetch { remote, ref_name } => {
            let mut repository = load_repository()?;
            let token = require_token(&repository)?;
            let result = repository.fetch(&remote, &token, ref_name.as_deref())?;
            println!(
                "Fetched {} object(s), updated {} ref(s)",
                result.downloaded_objects,
                result.updated_refs.len()
            );
        }
        Commands::Push {
            remote,
            refspec,
            force,
        } => {
            let repository = load_repository()?;
            let token = require_token(&repository)?;
            let (local_ref, remote_ref) = match refspec.split_once(':') {
                Some((local, remote_ref)) => (local.to_string(), remote_ref.to_string()),
                None => (refspec.clone(), refspec.clone()),
            };
            match repository.push(&remote, &local_ref, &remote_ref, force, &token)? {
                PushOutcome::UpToDate => println!("Everything up-to-date."),
                PushOutcome::Updated {
                    ref_name,
                    new_tip,
                    uploaded_objects,
                } => println!(
                    "Pushed {} object(s); {} -> {}",
                    uploaded_objects,
                    ref_name,
                    new_tip.to_short_oid()
                ),
            }
        }
        Commands::Pull { remote, branch } => {
            let mut repository = load_repository()?;
            let token = require_token(&repository)?;
            let branch = branch.unwrap_or_else(|| "main".to_string());
            match repository.pull(&remote, &branch, &token)? {
                MergeOutcome::AlreadyUpToDate => println!("Already up to date."),
                MergeOutcome::FastForward(oid) => {
                    println!("Fast-forward to {}", oid.to_short_oid());
                }
                MergeOutcome::Merged(oid) => println!("Merge made commit {}", oid.to_short_oid()),
                MergeOutcome::Conflicts(paths) => {
                    for path in &paths {
                        println!("CONFLICT (content): {}", path.display());
                    }
                    anyhow::bail!("automatic merge failed; fix conflicts and commit the result");
                }
            }
        }
        Commands::Register {
            username,
            password,
            server,
        } => {
            let (host, port) = parse_host_port(&server)?;
            let mut client = RemoteClient::connect(&host, port)?;
            let (succeeded, server_message) = client.register_user(&username, &password)?;
            if succeeded {
                println!("Registered: {}", server_message);
            } else {
                anyhow::bail!("registration failed: {}", server_message);
            }
        }
        Commands::Login {
            username,
            password,
            server,
        } => {
            let (host, port) = parse_host_port(&server)?;
            let mut client = RemoteClient::connect(&host, port)?;
            match client.login_user(&username, &password)? {
                Ok(token) => {
                    println!("Login succeeded.");
                    // cache the token when run inside a repository
                    match load_repository() {
                        Ok(repository) => {
                            repository.write_cached_token(&token)?;
                            println!("Token saved for this repository.");
                        }
                        Err(_) => {
                            println!("Not inside a repository; token not saved.");
                        }
                    }
                }
                Err(server_message) => anyhow::bail!("login failed: {}", server_message),
            }
        }
        Commands::Server {
            action:
                ServerAction::Start {
                    port,
                    repo_root,
                    token_secret,
                    log_dir,
                    log_name,
                },
        } => {
            let log_dir = log_dir.or_else(|| Some(repo_root.join("logs")));
            biogit::server::start(ServerConfig {
                port,
                repo_root,
                token_secret,
                log_dir,
                log_name,
            })?;
        }
    }

    Ok(())
}
