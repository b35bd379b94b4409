use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use school_portal::app::App;
use school_portal::cache::SqliteStore;
use school_portal::config::Config;
use school_portal::data::tracker::{VisitTracker, HEARTBEAT_PERIOD};
use school_portal::remote::HttpRemote;
use school_portal::router::NoopHistory;

#[derive(Parser, Debug)]
#[command(name = "school-portal")]
#[command(about = "Offline-tolerant data layer for a school website")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/school-portal/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Initial location, e.g. "/?page=news-detail&id=42"
  #[arg(short, long)]
  location: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let cache = Arc::new(SqliteStore::open()?);
  let remote = Arc::new(HttpRemote::new(&config)?);

  let mut app = App::new(
    Arc::clone(&cache),
    Arc::clone(&remote),
    config.retry.policy(),
    NoopHistory,
  );
  if let Some(location) = args.location.as_deref() {
    app.router.handle_location(location);
  }

  app.bootstrap().await;
  app.load_post_detail().await?;

  let tracker = VisitTracker::new(cache, remote);
  tracker.track_visit().await;
  let heartbeat = tracker.spawn_heartbeat(HEARTBEAT_PERIOD);

  let stats = tracker.visitor_stats().await;
  println!("{}", app.state.config.name);
  println!(
    "route: {}  posts: {}  menu: {}  staff: {}",
    app.router.current().to_location(),
    app.state.posts.len(),
    app.state.menu.len(),
    app.state.staff.len(),
  );
  if let Some(post) = &app.state.detail {
    println!("viewing: {}", post.title);
  }
  if let Some(err) = &app.state.data_error {
    eprintln!("data degraded: {}", err);
  }
  println!(
    "visits: {} total, {} today, {} this month, {} online",
    stats.total_visits, stats.today_visits, stats.month_visits, stats.online
  );

  heartbeat.abort();
  Ok(())
}
