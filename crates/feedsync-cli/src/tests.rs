use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["feedsync-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["feedsync-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["feedsync-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn sync_defaults_to_postgres_state() {
    let cli = Cli::try_parse_from(["feedsync-cli", "sync"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync { in_memory: false })
    ));
}

#[test]
fn sync_in_memory_flag() {
    let cli = Cli::try_parse_from(["feedsync-cli", "sync", "--in-memory"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Sync { in_memory: true })));
}

#[test]
fn parses_status_command() {
    let cli = Cli::try_parse_from(["feedsync-cli", "status"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Status)));
}

#[test]
fn notify_updated_splits_website_list() {
    let cli = Cli::try_parse_from([
        "feedsync-cli",
        "notify",
        "updated",
        "101",
        "--websites",
        "1,2",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Notify {
            command: NotifyCommands::Updated { id: 101, ref website_ids }
        }) if *website_ids == [1, 2]
    ));
}

#[test]
fn notify_updated_requires_websites() {
    assert!(Cli::try_parse_from(["feedsync-cli", "notify", "updated", "101"]).is_err());
}

#[test]
fn notify_deleted_defaults_to_simple_without_children() {
    let cli = Cli::try_parse_from([
        "feedsync-cli",
        "notify",
        "deleted",
        "200",
        "--websites",
        "1",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Notify {
            command: NotifyCommands::Deleted { id: 200, ref kind, ref child_ids, .. }
        }) if kind == "simple" && child_ids.is_empty()
    ));
}

#[test]
fn notify_deleted_configurable_with_children() {
    let cli = Cli::try_parse_from([
        "feedsync-cli",
        "notify",
        "deleted",
        "100",
        "--type",
        "configurable",
        "--websites",
        "1",
        "--children",
        "101,102",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Notify {
            command: NotifyCommands::Deleted { id: 100, ref kind, ref child_ids, .. }
        }) if kind == "configurable" && *child_ids == [101, 102]
    ));
}

#[test]
fn notify_attributes_takes_many_ids() {
    let cli =
        Cli::try_parse_from(["feedsync-cli", "notify", "attributes", "100", "200", "300"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Notify {
            command: NotifyCommands::Attributes { ref ids }
        }) if *ids == [100, 200, 300]
    ));
}

#[test]
fn notify_attributes_requires_ids() {
    assert!(Cli::try_parse_from(["feedsync-cli", "notify", "attributes"]).is_err());
}

#[test]
fn unknown_db_command_is_rejected() {
    assert!(Cli::try_parse_from(["feedsync-cli", "db", "seed"]).is_err());
}
