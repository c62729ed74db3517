use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use flows::coordinators::reassign_coordinator;
use shared::domain::{CallType, InstitutionId, User, UserId};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/requests.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Opens a call between two RFC 3339 timestamps.
    CreateCall {
        name: String,
        call_type: CallType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AddCountry {
        code: String,
        name: String,
    },
    AddInstitution {
        name: String,
        #[arg(long)]
        country: Option<String>,
    },
    AssignCoordinator {
        institution_id: InstitutionId,
        call_type: CallType,
        user_id: UserId,
        name: String,
        email: String,
    },
    AddScorer {
        user_id: UserId,
        name: String,
        email: String,
        country: String,
    },
    /// Moves existing institution forms to the institution's current
    /// coordinator.
    ReassignCoordinator {
        institution_id: InstitutionId,
        call_type: CallType,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateCall {
            name,
            call_type,
            start,
            end,
        } => {
            let call_id = storage.create_call(&name, call_type, start, end).await?;
            println!("created call_id={call_id}");
        }
        Command::AddCountry { code, name } => {
            storage.upsert_country(&code, &name).await?;
            println!("stored country {code}");
        }
        Command::AddInstitution { name, country } => {
            let institution_id = storage
                .create_institution(&name, country.as_deref())
                .await?;
            println!("created institution_id={institution_id}");
        }
        Command::AssignCoordinator {
            institution_id,
            call_type,
            user_id,
            name,
            email,
        } => {
            let user = User {
                id: user_id,
                name,
                email,
            };
            storage
                .assign_coordinator(institution_id, call_type, &user)
                .await?;
            println!(
                "coordinator of institution_id={institution_id} for {} is now user_id={user_id}",
                call_type.as_str()
            );
        }
        Command::AddScorer {
            user_id,
            name,
            email,
            country,
        } => {
            let user = User {
                id: user_id,
                name,
                email,
            };
            storage.add_scorer(&user, &country).await?;
            println!("user_id={user_id} scores {country}");
        }
        Command::ReassignCoordinator {
            institution_id,
            call_type,
        } => {
            let updated =
                reassign_coordinator(&storage, &storage, institution_id, call_type).await?;
            println!("reassigned {updated} institution forms");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_call_arguments() {
        let cli = Cli::try_parse_from([
            "tools",
            "create-call",
            "Spring 2026",
            "ta",
            "2026-03-01T00:00:00Z",
            "2026-06-01T00:00:00Z",
        ])
        .expect("parse");
        let Command::CreateCall {
            name, call_type, ..
        } = cli.command
        else {
            panic!("unexpected command");
        };
        assert_eq!(name, "Spring 2026");
        assert_eq!(call_type, CallType::Ta);
    }

    #[test]
    fn rejects_unknown_call_type() {
        let err = Cli::try_parse_from([
            "tools",
            "reassign-coordinator",
            &InstitutionId::new().to_string(),
            "xa",
        ])
        .expect_err("should fail");
        assert!(err.to_string().contains("unknown call type"));
    }
}
