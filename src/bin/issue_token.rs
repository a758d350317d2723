//! Mint an operator token signed with `JWT_SECRET_KEY`.
//!
//! `issue_token --subject ops@casabricks.in --role admin --ttl-hours 12`

use casabricks::models::auth::UserRole;
use casabricks::services::auth::JwtKeys;
use chrono::Duration;
use clap::Parser;
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "issue_token")]
#[command(about = "Issue a signed operator token for the casabricks admin API")]
struct Args {
    /// User id placed in the `sub` claim
    #[arg(short, long)]
    subject: String,

    /// admin, agent or buyer
    #[arg(short, long, default_value = "admin", value_parser = UserRole::from_str)]
    role: UserRole,

    #[arg(long, default_value_t = 24)]
    ttl_hours: i64,

    /// HS256 secret shared with the API server
    #[arg(long, env = "JWT_SECRET_KEY", hide_env_values = true)]
    secret: String,
}

impl Args {
    fn issue(&self) -> Result<String, casabricks::services::auth::AuthError> {
        JwtKeys::new(&self.secret).issue(&self.subject, self.role, Duration::hours(self.ttl_hours))
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match args.issue() {
        Ok(token) => {
            println!("{token}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to issue token: {e}");
            ExitCode::FAILURE
        }
    }
}
