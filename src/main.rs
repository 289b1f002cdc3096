use clap::{Args, Parser, Subcommand};
use crossterm::tty::IsTty;
use derby::{
    api::ApiClient,
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    error::ApiError,
    models::{RaceRunForm, RacerForm, RunType, SoapboxClass, SoapboxForm, TeamForm},
    results::{Filter, SortKey, SortSpec, TeamFilter},
    runtime::{CrosstermEventSource, Runner},
    session::Session,
    tokens::{FileTokenStore, TokenStore},
    transport::{ReqwestTransport, Transport},
    ui::{self, plain::render_plain, TerminalGuard},
    util::format_seconds,
    view::{ResultsView, ViewAction},
};
use std::{
    error::Error,
    io::{self, stdout, BufRead},
    path::PathBuf,
};

/// results board and admin client for soapbox derby events
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// backend API base URL (default: $DERBY_API_BASE_URL, config file, then http://127.0.0.1:8000/api)
    #[clap(long, global = true)]
    base_url: Option<String>,

    /// log at debug level
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// show the ranked results table
    Results(ResultsArgs),
    /// log in and store the session tokens
    Login {
        #[clap(short, long)]
        username: String,
        /// password (default: $DERBY_PASSWORD, else read from stdin)
        #[clap(short, long)]
        password: Option<String>,
    },
    /// forget the stored session
    Logout,
    /// show whether a session is stored
    Whoami,
    /// manage teams
    #[clap(subcommand)]
    Teams(TeamsCommand),
    /// manage soapboxes
    #[clap(subcommand)]
    Soapboxes(SoapboxesCommand),
    /// manage racers
    #[clap(subcommand)]
    Racers(RacersCommand),
    /// manage race runs
    #[clap(subcommand)]
    Runs(RunsCommand),
    /// show the stored settings, or change them
    Config {
        /// backend API base URL to store
        #[clap(long)]
        set_base_url: Option<String>,
        /// sort key the results view starts with
        #[clap(long, value_parser = sort_key_name)]
        set_default_sort: Option<String>,
        /// start the results view in descending order
        #[clap(long)]
        set_descending: Option<bool>,
    },
}

#[derive(Args, Debug)]
struct ResultsArgs {
    /// only this soapbox class (LJ, LS, HJ, HS, XK, VT, UN)
    #[clap(long, value_parser = parse_class)]
    class: Option<SoapboxClass>,

    /// only this team id, or "solo" for racers without a team
    #[clap(long, value_parser = parse_team_filter)]
    team: Option<TeamFilter>,

    /// rank, name, team, class, time_PR, time_H1, time_H2 or best
    #[clap(long, value_parser = parse_sort_key)]
    sort: Option<SortKey>,

    /// sort descending
    #[clap(long)]
    desc: bool,

    /// print the table instead of opening the interactive view
    #[clap(long)]
    plain: bool,
}

#[derive(Subcommand, Debug)]
enum TeamsCommand {
    List,
    Show { id: i64 },
    Create { name: String },
    Update { id: i64, name: String },
    Delete { id: i64 },
}

#[derive(Args, Debug)]
struct SoapboxFields {
    name: String,
    #[clap(long, value_parser = parse_class, default_value = "UN")]
    class: SoapboxClass,
    #[clap(long)]
    team: Option<i64>,
}

impl From<SoapboxFields> for SoapboxForm {
    fn from(f: SoapboxFields) -> Self {
        SoapboxForm {
            name: f.name,
            soapbox_class: f.class,
            team: f.team,
        }
    }
}

#[derive(Subcommand, Debug)]
enum SoapboxesCommand {
    List,
    Create(SoapboxFields),
    Update {
        id: i64,
        #[clap(flatten)]
        fields: SoapboxFields,
    },
    Delete { id: i64 },
}

#[derive(Args, Debug)]
struct RacerFields {
    first_name: String,
    last_name: String,
    #[clap(long)]
    start_number: Option<String>,
    #[clap(long, value_parser = parse_class, default_value = "UN")]
    class: SoapboxClass,
    #[clap(long)]
    team: Option<i64>,
    #[clap(long)]
    soapbox: Option<i64>,
}

impl From<RacerFields> for RacerForm {
    fn from(f: RacerFields) -> Self {
        RacerForm {
            first_name: f.first_name,
            last_name: f.last_name,
            start_number: f.start_number,
            soapbox_class: f.class,
            team: f.team,
            soapbox: f.soapbox,
        }
    }
}

#[derive(Subcommand, Debug)]
enum RacersCommand {
    List {
        #[clap(long, value_parser = parse_class)]
        class: Option<SoapboxClass>,
        #[clap(long)]
        team: Option<i64>,
    },
    Show { id: i64 },
    Create(RacerFields),
    Update {
        id: i64,
        #[clap(flatten)]
        fields: RacerFields,
    },
    Delete { id: i64 },
}

#[derive(Args, Debug)]
struct RunFields {
    /// racer id
    #[clap(long, conflicts_with = "start_number", required_unless_present = "start_number")]
    racer: Option<i64>,
    /// racer start number, instead of --racer
    #[clap(long)]
    start_number: Option<String>,
    /// PR, H1 or H2
    #[clap(long = "type", value_parser = parse_run_type)]
    run_type: RunType,
    /// sequence number within the run type
    #[clap(long, default_value_t = 1)]
    seq: u16,
    /// elapsed seconds, e.g. 45.123
    #[clap(long)]
    time: Option<String>,
    #[clap(long)]
    dq: bool,
    #[clap(long)]
    notes: Option<String>,
}

impl From<RunFields> for RaceRunForm {
    fn from(f: RunFields) -> Self {
        RaceRunForm {
            racer_id: f.racer,
            racer_start_number: f.start_number,
            run_type: f.run_type,
            run_identifier: f.seq,
            time_in_seconds: f.time,
            disqualified: f.dq,
            notes: f.notes,
        }
    }
}

#[derive(Subcommand, Debug)]
enum RunsCommand {
    List {
        /// only runs of this racer id
        #[clap(long)]
        racer: Option<i64>,
    },
    Create(RunFields),
    Update {
        id: i64,
        #[clap(flatten)]
        fields: RunFields,
    },
    Delete { id: i64 },
}

fn parse_class(s: &str) -> Result<SoapboxClass, String> {
    SoapboxClass::ALL
        .into_iter()
        .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown class '{s}', expected one of LJ, LS, HJ, HS, XK, VT, UN"))
}

fn parse_run_type(s: &str) -> Result<RunType, String> {
    RunType::from_code(s).ok_or_else(|| format!("unknown run type '{s}', expected PR, H1 or H2"))
}

fn parse_team_filter(s: &str) -> Result<TeamFilter, String> {
    if s.eq_ignore_ascii_case("solo") {
        return Ok(TeamFilter::Solo);
    }
    s.trim()
        .parse::<i64>()
        .map(TeamFilter::Team)
        .map_err(|_| format!("expected a team id or 'solo', got '{s}'"))
}

fn parse_sort_key(s: &str) -> Result<SortKey, String> {
    SortKey::parse(s).ok_or_else(|| format!("unknown sort key '{s}'"))
}

fn sort_key_name(s: &str) -> Result<String, String> {
    parse_sort_key(s).map(|_| s.trim().to_string())
}

type Api = ApiClient<ReqwestTransport, FileTokenStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_path = AppDirs::log_path().unwrap_or_else(|| PathBuf::from("derby.log"));
    if let Err(e) = derby::logging::setup_logging(&log_path, cli.verbose) {
        eprintln!("logging disabled: {e}");
    }

    let config_store = FileConfigStore::new();
    let config = config_store.load();
    let base_url = config.resolve_base_url(cli.base_url.as_deref());
    log::debug!("using backend {base_url}");

    let session = Session::new(ReqwestTransport::new(&base_url)?, FileTokenStore::new());
    // The binary is the one listener for session loss.
    let mut auth_lost = session.subscribe();
    let api = ApiClient::new(session);

    let outcome = match cli.command {
        Command::Results(args) => {
            let default_sort = SortSpec::new(
                SortKey::parse(&config.default_sort).unwrap_or(SortKey::Rank),
                !config.default_descending,
            );
            show_results(&api, args, default_sort).await
        }
        Command::Login { username, password } => login(&api, &username, password).await,
        Command::Logout => {
            api.session().logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => {
            if api.session().is_logged_in() {
                println!("Session stored in {}", api.session().store().path().display());
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        Command::Teams(cmd) => teams(&api, cmd).await,
        Command::Soapboxes(cmd) => soapboxes(&api, cmd).await,
        Command::Racers(cmd) => racers(&api, cmd).await,
        Command::Runs(cmd) => runs(&api, cmd).await,
        Command::Config {
            set_base_url,
            set_default_sort,
            set_descending,
        } => update_config(&config_store, config, set_base_url, set_default_sort, set_descending),
    };

    // RefreshAbandoned ends the session without a signal
    let session_lost = auth_lost.try_recv().is_ok()
        || matches!(&outcome, Err(e) if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_auth_loss));
    if session_lost {
        log::warn!("session lost, redirecting user to login");
        eprintln!("Your session has expired. Log in again with `derby login -u <username>`.");
    }
    if let Err(e) = outcome {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn update_config(
    store: &FileConfigStore,
    mut config: Config,
    base_url: Option<String>,
    default_sort: Option<String>,
    descending: Option<bool>,
) -> Result<(), Box<dyn Error>> {
    let changed = base_url.is_some() || default_sort.is_some() || descending.is_some();
    if let Some(url) = base_url {
        config.base_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    if let Some(key) = default_sort {
        config.default_sort = key;
    }
    if let Some(desc) = descending {
        config.default_descending = desc;
    }
    if changed {
        store.save(&config)?;
        log::info!("config written to {}", store.path().display());
    }
    println!("# {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn show_results(api: &Api, args: ResultsArgs, default_sort: SortSpec) -> Result<(), Box<dyn Error>> {
    let racers = api.racers(&[]).await?;
    let sort = match args.sort {
        Some(key) => SortSpec::new(key, !args.desc),
        None if args.desc => SortSpec::new(default_sort.key, false),
        None => default_sort,
    };
    let mut view = ResultsView::new(racers, sort);
    view.filter = Filter {
        class: args.class,
        team: args.team,
    };

    if args.plain || !stdout().is_tty() {
        print!("{}", render_plain(&view.rows(), &view.sort));
        return Ok(());
    }

    let mut guard = TerminalGuard::enter()?;
    let runner = Runner::new(CrosstermEventSource::new(), ui::tick_rate());
    loop {
        match ui::run_results(&mut guard.terminal, &mut view, &runner, None)? {
            ViewAction::Reload => match api.racers(&[]).await {
                Ok(racers) => {
                    view.replace_racers(racers);
                    view.status = None;
                }
                Err(e) => {
                    log::warn!("reload failed: {e}");
                    view.status = Some(format!("reload failed: {e}"));
                }
            },
            _ => break,
        }
    }
    Ok(())
}

async fn login(api: &Api, username: &str, password: Option<String>) -> Result<(), Box<dyn Error>> {
    let password = match password.or_else(|| std::env::var("DERBY_PASSWORD").ok()) {
        Some(p) => p,
        None => {
            eprint!("Password: ");
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    api.session().login(username, &password).await?;
    println!("Logged in as {username}.");
    Ok(())
}

async fn teams<T: Transport, S: TokenStore>(api: &ApiClient<T, S>, cmd: TeamsCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        TeamsCommand::List => {
            for team in api.teams().await? {
                let count = team.racer_count.map(|c| c.to_string()).unwrap_or_default();
                println!("{}\t{}\t{count}", team.id, team.name);
            }
        }
        TeamsCommand::Show { id } => {
            let team = api.team(id).await?;
            println!("{}\t{}", team.id, team.name);
        }
        TeamsCommand::Create { name } => {
            let team = api.create_team(&TeamForm { name }).await?;
            println!("Created team {} ({}).", team.name, team.id);
        }
        TeamsCommand::Update { id, name } => {
            let team = api.update_team(id, &TeamForm { name }).await?;
            println!("Updated team {} ({}).", team.name, team.id);
        }
        TeamsCommand::Delete { id } => {
            api.delete_team(id).await?;
            println!("Deleted team {id}.");
        }
    }
    Ok(())
}

async fn soapboxes<T: Transport, S: TokenStore>(
    api: &ApiClient<T, S>,
    cmd: SoapboxesCommand,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        SoapboxesCommand::List => {
            for sb in api.soapboxes().await? {
                let team = sb.team.map(|t| t.to_string()).unwrap_or_default();
                println!("{}\t{}\t{}\t{team}", sb.id, sb.name, sb.soapbox_class.label());
            }
        }
        SoapboxesCommand::Create(fields) => {
            let sb = api.create_soapbox(&fields.into()).await?;
            println!("Created soapbox {} ({}).", sb.name, sb.id);
        }
        SoapboxesCommand::Update { id, fields } => {
            let sb = api.update_soapbox(id, &fields.into()).await?;
            println!("Updated soapbox {} ({}).", sb.name, sb.id);
        }
        SoapboxesCommand::Delete { id } => {
            api.delete_soapbox(id).await?;
            println!("Deleted soapbox {id}.");
        }
    }
    Ok(())
}

async fn racers<T: Transport, S: TokenStore>(api: &ApiClient<T, S>, cmd: RacersCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        RacersCommand::List { class, team } => {
            let mut params = Vec::new();
            if let Some(c) = class {
                params.push(("soapbox_class", c.code().to_string()));
            }
            if let Some(t) = team {
                params.push(("team", t.to_string()));
            }
            for r in api.racers(&params).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    r.id,
                    r.start_number.as_deref().unwrap_or(""),
                    r.display_name(),
                    r.class_label(),
                    r.team_name.as_deref().unwrap_or("")
                );
            }
        }
        RacersCommand::Show { id } => {
            let r = api.racer(id).await?;
            println!("{} (#{}) {}", r.display_name(), r.start_number.as_deref().unwrap_or("-"), r.class_label());
            for run in &r.race_runs {
                let time = if run.disqualified {
                    "DQ".to_string()
                } else {
                    format_seconds(run.qualifying_time())
                };
                println!("  {} {}\t{time}", run.run_type.code(), run.run_identifier);
            }
        }
        RacersCommand::Create(fields) => {
            let r = api.create_racer(&fields.into()).await?;
            println!("Created racer {} ({}).", r.display_name(), r.id);
        }
        RacersCommand::Update { id, fields } => {
            let r = api.update_racer(id, &fields.into()).await?;
            println!("Updated racer {} ({}).", r.display_name(), r.id);
        }
        RacersCommand::Delete { id } => {
            api.delete_racer(id).await?;
            println!("Deleted racer {id}.");
        }
    }
    Ok(())
}

async fn runs<T: Transport, S: TokenStore>(api: &ApiClient<T, S>, cmd: RunsCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        RunsCommand::List { racer } => {
            let params: Vec<(&str, String)> = racer.map(|id| ("racer", id.to_string())).into_iter().collect();
            for run in api.race_runs(&params).await? {
                let time = if run.disqualified {
                    "DQ".to_string()
                } else {
                    format_seconds(run.qualifying_time())
                };
                let recorded = run
                    .recorded_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{} {}\t{time}\t{recorded}",
                    run.id,
                    run.racer.map(|r| r.to_string()).unwrap_or_default(),
                    run.run_type.code(),
                    run.run_identifier
                );
            }
        }
        RunsCommand::Create(fields) => {
            let run = api.create_race_run(&fields.into()).await?;
            println!("Recorded run {}.", run.id);
        }
        RunsCommand::Update { id, fields } => {
            let run = api.update_race_run(id, &fields.into()).await?;
            println!("Updated run {}.", run.id);
        }
        RunsCommand::Delete { id } => {
            api.delete_race_run(id).await?;
            println!("Deleted run {id}.");
        }
    }
    Ok(())
}
