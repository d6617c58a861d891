// tests/conversion_integration.rs
//! End-to-end catalog conversion tests
//!
//! These drive `convert_all` over temporary catalogs and inspect the
//! resulting platform trees:
//! - Repeated and reordered runs produce identical output
//! - Unsupported platforms and reserved directories are skipped
//! - Ports stay unique across records of one platform
//! - Failed emissions leave no partial directory behind

mod common;

use appcatalog::assets::{AssetFetcher, is_png};
use appcatalog::driver::Outcome;
use appcatalog::{ConvertOptions, Platform, convert_all};
use common::{ALL_PLATFORMS, Catalog, WEB_AND_DB, snapshot};

fn run(catalog: &Catalog, platforms: &[Platform]) -> appcatalog::Summary {
    convert_all(
        &catalog.config(),
        platforms,
        &ConvertOptions::default(),
        &AssetFetcher::offline(),
    )
    .unwrap()
}

// =============================================================================
// DETERMINISM
// =============================================================================

#[test]
fn test_second_run_is_byte_identical() {
    let catalog = Catalog::new();
    catalog.add_record("alpha", ALL_PLATFORMS, WEB_AND_DB);
    catalog.add_record("beta", ALL_PLATFORMS, WEB_AND_DB);

    let first_summary = run(&catalog, &Platform::ALL);
    assert!(first_summary.is_success());
    let first = snapshot(&catalog.output_dir());

    let second_summary = run(&catalog, &Platform::ALL);
    assert!(second_summary.is_success());
    let second = snapshot(&catalog.output_dir());

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_output_independent_of_creation_order() {
    let forward = Catalog::new();
    for id in ["alpha", "beta", "gamma"] {
        forward.add_record(id, ALL_PLATFORMS, WEB_AND_DB);
    }
    let reverse = Catalog::new();
    for id in ["gamma", "beta", "alpha"] {
        reverse.add_record(id, ALL_PLATFORMS, WEB_AND_DB);
    }

    run(&forward, &Platform::ALL);
    run(&reverse, &Platform::ALL);

    assert_eq!(
        snapshot(&forward.output_dir()),
        snapshot(&reverse.output_dir())
    );
}

// =============================================================================
// SKIPS AND FAILURES
// =============================================================================

#[test]
fn test_unsupported_platform_writes_nothing() {
    let catalog = Catalog::new();
    catalog.add_record(
        "alpha",
        r#"{"casaos": {}, "umbrel": {"supported": false}}"#,
        WEB_AND_DB,
    );
    catalog.add_record("_template", ALL_PLATFORMS, WEB_AND_DB);

    let summary = run(&catalog, &[Platform::CasaOs, Platform::Umbrel, Platform::Cosmos]);

    assert!(summary.is_success());
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.reserved, 1);
    assert!(catalog.output_dir().join("casaos/alpha/docker-compose.yml").exists());
    assert!(!catalog.output_dir().join("umbrel/alpha").exists());
    assert!(!catalog.output_dir().join("cosmos/alpha").exists());
    assert!(!catalog.output_dir().join("casaos/_template").exists());
}

#[test]
fn test_failed_emission_is_rolled_back() {
    let catalog = Catalog::new();
    catalog.add_record(
        "alpha",
        r#"{"umbrel": {"folder_name": "___"}, "dockge": {}}"#,
        WEB_AND_DB,
    );

    let summary = run(&catalog, &[Platform::Dockge, Platform::Umbrel]);

    assert!(!summary.is_success());
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.converted, 1);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.app, "alpha");
    assert_eq!(failure.platform, Some(Platform::Umbrel));

    assert!(!catalog.output_dir().join("umbrel/___").exists());
    assert!(catalog.output_dir().join("dockge/alpha/compose.yaml").exists());
}

#[test]
fn test_one_bad_record_does_not_stop_the_run() {
    let catalog = Catalog::new();
    catalog.add_record("alpha", ALL_PLATFORMS, WEB_AND_DB);
    catalog.add_raw("broken", "{ not json", WEB_AND_DB);
    catalog.add_record("gamma", ALL_PLATFORMS, WEB_AND_DB);

    let summary = run(&catalog, &Platform::ALL);

    assert_eq!(summary.errored, 1);
    assert_eq!(summary.converted, 12);
    assert!(catalog.output_dir().join("runtipi/gamma/config.json").exists());
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_minimal_record() {
    let catalog = Catalog::new();
    catalog.add_raw(
        "demo",
        r#"{"metadata": {"id": "demo", "version": "1.0.0"},
            "technical": {"main_image": "org/demo", "default_port": "8080"},
            "compatibility": {"umbrel": {}}}"#,
        r#"
services:
  app:
    image: org/demo:1.0.0
    ports: ["8080:8080"]
    volumes: ["./data:/data"]
"#,
    );

    let summary = run(&catalog, &[Platform::Umbrel]);
    assert!(summary.is_success());

    let manifest = catalog.read_yaml("umbrel/demo/umbrel-app.yml");
    let port = manifest["port"].as_u64().unwrap();
    assert!(port >= 10_000);

    let compose = catalog.read_yaml("umbrel/demo/docker-compose.yml");
    assert_eq!(
        compose["services"]["app"]["volumes"][0].as_str(),
        Some("${APP_DATA_DIR}/data:/data")
    );
}

#[test]
fn test_host_networking() {
    let catalog = Catalog::new();
    catalog.add_record(
        "hass",
        r#"{"umbrel": {}, "runtipi": {}}"#,
        r#"
services:
  homeassistant:
    image: homeassistant/home-assistant:stable
    network_mode: host
    ports:
      - "8123:8123"
"#,
    );

    let summary = run(&catalog, &[Platform::Runtipi, Platform::Umbrel]);
    assert!(summary.is_success());

    let compose = catalog.read_yaml("umbrel/hass/docker-compose.yml");
    assert!(compose["services"].get("app_proxy").is_none());
    let manifest = catalog.read_yaml("umbrel/hass/umbrel-app.yml");
    assert_eq!(manifest["port"].as_u64(), Some(8123));

    let compose = catalog.read_yaml("runtipi/hass/docker-compose.yml");
    let main = &compose["services"]["hass"];
    assert_eq!(main["network_mode"].as_str(), Some("host"));
    assert!(main.get("ports").is_none());
    assert!(main.get("networks").is_none());
    assert!(compose.get("networks").is_none());
}

#[test]
fn test_unreachable_icon_uses_placeholder() {
    let catalog = Catalog::new();
    catalog.add_record_with_icon(
        "alpha",
        r#"{"runtipi": {}}"#,
        WEB_AND_DB,
        "http://127.0.0.1:1/icon.png",
    );

    let mut config = catalog.config();
    config.assets.fetch = true;
    config.assets.timeout_secs = 2;
    let assets = AssetFetcher::new(&config.assets, false);

    let summary = convert_all(
        &config,
        &[Platform::Runtipi],
        &ConvertOptions::default(),
        &assets,
    )
    .unwrap();

    assert!(summary.is_success());
    match &summary.outcomes[0].outcome {
        Outcome::Converted { warnings, .. } => assert!(!warnings.is_empty()),
        other => panic!("expected conversion, got {:?}", other),
    }
    let logo = std::fs::read(catalog.output_dir().join("runtipi/alpha/metadata/logo.png")).unwrap();
    assert!(is_png(&logo));
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[test]
fn test_umbrel_ports_unique_across_records() {
    let catalog = Catalog::new();
    catalog.add_record("alpha", r#"{"umbrel": {}}"#, WEB_AND_DB);
    catalog.add_record("beta", r#"{"umbrel": {}}"#, WEB_AND_DB);

    run(&catalog, &[Platform::Umbrel]);

    let alpha = catalog.read_yaml("umbrel/alpha/umbrel-app.yml");
    let beta = catalog.read_yaml("umbrel/beta/umbrel-app.yml");
    assert_eq!(alpha["port"].as_u64(), Some(18_080));
    assert_eq!(beta["port"].as_u64(), Some(10_000));
}

#[test]
fn test_master_template_integrity() {
    let catalog = Catalog::new();
    for id in ["charlie", "alpha", "bravo"] {
        catalog.add_record(id, r#"{"portainer": {}}"#, WEB_AND_DB);
    }
    catalog.add_record("delta", r#"{"dockge": {}}"#, WEB_AND_DB);

    run(&catalog, &[Platform::Portainer, Platform::Dockge]);

    let doc = catalog.read_json("portainer/templates.json");
    assert_eq!(doc["version"], "2");
    let templates = doc["templates"].as_array().unwrap();
    assert_eq!(templates.len(), 3);
    let ids: Vec<u64> = templates.iter().map(|t| t["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(templates[0]["name"], "alpha");
    assert_eq!(templates[2]["name"], "charlie");
}

#[test]
fn test_volume_override_round_trip() {
    let compose = r#"
services:
  myapp:
    image: org/myapp
    ports: ["8080:8080"]
    volumes:
      - myapp_data_config:/config
      - myapp_cache:/cache
volumes:
  myapp_data_config: {}
  myapp_cache: {}
"#;
    let catalog = Catalog::new();
    catalog.add_record(
        "myapp",
        r#"{"umbrel": {"volume_mappings": {"myapp_cache": "cfg"}}, "casaos": {}}"#,
        compose,
    );

    run(&catalog, &[Platform::CasaOs, Platform::Umbrel]);

    let umbrel = catalog.read_yaml("umbrel/myapp/docker-compose.yml");
    let volumes = &umbrel["services"]["myapp"]["volumes"];
    assert_eq!(volumes[0].as_str(), Some("${APP_DATA_DIR}/data/config:/config"));
    assert_eq!(volumes[1].as_str(), Some("${APP_DATA_DIR}/cfg:/cache"));
    assert!(umbrel.get("volumes").is_none());

    let casaos = catalog.read_yaml("casaos/myapp/docker-compose.yml");
    let volumes = &casaos["services"]["myapp"]["volumes"];
    assert_eq!(
        volumes[0].as_str(),
        Some("/DATA/AppData/$AppID/data/config:/config")
    );
}

#[test]
fn test_dry_run_leaves_output_untouched() {
    let catalog = Catalog::new();
    catalog.add_record("alpha", ALL_PLATFORMS, WEB_AND_DB);
    let options = ConvertOptions {
        dry_run: true,
        specific_app: None,
    };

    let summary =
        convert_all(&catalog.config(), &Platform::ALL, &options, &AssetFetcher::offline()).unwrap();

    assert_eq!(summary.converted, 6);
    assert!(!catalog.output_dir().exists());
}
