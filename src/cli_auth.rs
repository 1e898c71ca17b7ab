use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

mod cli_style;

use cli_style::{
    get_prompt, get_styles, print_banner, print_command_echo, print_empty_list, print_error,
    print_goodbye, print_key_value, print_list_item, print_section_footer, print_section_header,
    print_success, print_warning,
};
use moodify_server::user::{SqliteUserStore, UserManager};

use rustyline::{
    completion::Completer,
    highlight::Highlighter,
    history::FileHistory,
    validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles())]
struct CliArgs {
    /// Path to the Moodify SQLite database.
    #[clap(value_parser = parse_path, default_value = "moodify.db")]
    pub path: PathBuf,
}

#[derive(Parser)]
#[command(styles=get_styles(),name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user, with an empty profile, without any login.
    AddUser { username: String, email: String },

    /// Creates a password login for the given user.
    /// Fails if the user already has a password set.
    AddLogin { username: String, password: String },

    /// Change the password of a user, fails if no password was set.
    /// Tokens issued before the change stop working.
    UpdateLogin { username: String, password: String },

    /// Deletes the password login of a given user.
    DeleteLogin { username: String },

    /// Shows account, login and profile information of a given user.
    Show { username: String },

    /// Verifies the password of a given user without issuing any token.
    CheckPassword { username: String, password: String },

    /// Shows all usernames.
    UserHandles,

    /// Shows the path of the current db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

fn format_time(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn show_user(user_manager: &UserManager, username: &str) -> Result<()> {
    let Some(account) = user_manager.get_user_by_username(username)? else {
        print_warning(&format!("User {} not found.", username));
        return Ok(());
    };

    print_section_header(&format!("User {}", account.username));
    print_key_value("id", &account.id.to_string());
    print_key_value("email", &account.email);
    print_key_value("token version", &account.token_version.to_string());
    print_key_value("created", &format_time(account.created));

    let password = user_manager
        .get_user_credentials(username)?
        .and_then(|c| c.username_password);
    match password {
        Some(password) => {
            print_key_value("password set", &format_time(password.created));
            if let Some(last_used) = password.last_used {
                print_key_value("last login", &format_time(last_used));
            }
        }
        None => print_key_value("password", "(none)"),
    }

    match user_manager.get_profile_by_username(username)? {
        Some(profile) => {
            print_key_value("profile", &profile.id);
            print_key_value("mood history", &profile.mood_history.len().to_string());
            for mood in profile.mood_history.iter().rev().take(5) {
                print_list_item(mood, 2);
            }
            print_key_value(
                "listening history",
                &profile.listening_history.len().to_string(),
            );
            print_key_value(
                "saved recommendations",
                &profile.recommendations.len().to_string(),
            );
        }
        None => print_key_value("profile", "(deleted)"),
    }
    print_section_footer();
    Ok(())
}

fn execute_command(
    line: String,
    user_manager: &mut UserManager,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            print_command_echo(&line);
            match cli.command {
                InnerCommand::AddUser { username, email } => {
                    match user_manager.add_user(&username, &email) {
                        Ok(user_id) => {
                            print_success(&format!("Created user {} ({})", username, user_id))
                        }
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::AddLogin { username, password } => {
                    if let Err(err) = user_manager.create_password_credentials(&username, &password)
                    {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    print_success(&format!("Password set for {}", username));
                }
                InnerCommand::UpdateLogin { username, password } => {
                    if let Err(err) = user_manager.update_password_credentials(&username, &password)
                    {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    print_success(&format!("Password updated for {}", username));
                }
                InnerCommand::DeleteLogin { username } => {
                    if let Err(err) = user_manager.delete_password_credentials(&username) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    print_success(&format!("Password removed for {}", username));
                }
                InnerCommand::Show { username } => {
                    if let Err(err) = show_user(user_manager, &username) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                }
                InnerCommand::UserHandles => match user_manager.get_all_usernames() {
                    Ok(usernames) if usernames.is_empty() => print_empty_list("No users yet."),
                    Ok(usernames) => {
                        for username in usernames.iter() {
                            print_list_item(username, 1);
                        }
                    }
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Where => {
                    print_key_value("database", &db_path);
                }
                InnerCommand::CheckPassword { username, password } => {
                    let user_credentials = match user_manager.get_user_credentials(&username) {
                        Ok(Some(x)) => x,
                        Ok(None) => {
                            return CommandExecutionResult::Error(format!(
                                "User {} not found.",
                                username
                            ));
                        }
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    };
                    let password_credentials = match user_credentials.username_password {
                        Some(x) => x,
                        None => {
                            return CommandExecutionResult::Error(format!(
                                "User {} has no password set.",
                                username
                            ));
                        }
                    };
                    match password_credentials.verify(&password) {
                        Ok(true) => print_success("The password provided is correct!"),
                        Ok(false) => print_warning("Wrong password."),
                        Err(err) => {
                            return CommandExecutionResult::Error(format!(
                                "Could not verify the password, something went wrong: {}",
                                err
                            ))
                        }
                    }
                }
                InnerCommand::Exit => return CommandExecutionResult::Exit,
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct MoodifyHelper {
    commands_names: Vec<String>,
}

impl MoodifyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MoodifyHelper { commands_names }
    }
}

impl Completer for MoodifyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MoodifyHelper {}
impl Validator for MoodifyHelper {}
impl Helper for MoodifyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let db_path = cli_args.path;
    let user_store = SqliteUserStore::new(&db_path)?;
    let mut user_manager = UserManager::new(Box::new(user_store));

    print_banner();
    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MoodifyHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(MoodifyHelper::new()));

    let prompt = get_prompt();
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &mut user_manager, db_path.display().to_string()) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                print_error(&format!("{:?}", e));
                break;
            }
        }
    }
    print_goodbye();
    Ok(())
}
