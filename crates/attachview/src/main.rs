use bevy::diagnostic::{FrameTimeDiagnosticsPlugin, LogDiagnosticsPlugin};
use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;

use attachview::app::cli::Args;
use attachview::app::systems::index::AttachmentIndex;
use attachview::app::systems::router::OpenAttachment;
use attachview::app::systems::RecordService;
use attachview::lib::attachment::{Attachment, Link, DATA_REL};
use attachview::lib::fetch::ApiClient;
use attachview::lib::settings::{Settings, SETTINGS_FILENAME};
use attachview::{AttachviewPlugin, AttachviewUiPlugin};

/// Attachment given on the command line, opened on the first frame
#[derive(Resource)]
struct InitialAttachment(Option<Attachment>);

fn main() {
    // Parse command line arguments
    let args = Args::parse_args();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| SETTINGS_FILENAME.into());
    let settings = match Settings::load_from_path(&settings_path) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let config = match args.apply(&settings) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let client = match ApiClient::new(&config.base_url, config.timeout) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let initial = args.attachment.as_ref().map(|href| Attachment {
        id: serde_json::Value::Null,
        media_type: args.media_type.clone().unwrap_or_default(),
        name: args.name.clone().unwrap_or_else(|| href.clone()),
        links: vec![Link {
            rel: DATA_REL.to_string(),
            href: href.clone(),
            method: Some("GET".to_string()),
        }],
    });

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let mut app = App::new();
    app.add_plugins(
        DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Attachview".to_string(),
                    ..default()
                }),
                ..default()
            })
            .set(LogPlugin {
                level: log_level,
                ..default()
            }),
    );

    if args.diagnostics {
        app.add_plugins((
            FrameTimeDiagnosticsPlugin::default(),
            LogDiagnosticsPlugin::default(),
        ));
    }

    if args.verbose {
        info!("Starting Attachview against {}", config.base_url);
        info!("Normalization scope: {:?}", config.normalization_scope);
    }

    app.insert_resource(RecordService(client))
        .insert_resource(config)
        .insert_resource(AttachmentIndex::for_owner(args.owner_id.clone()))
        .insert_resource(InitialAttachment(initial))
        .add_plugins((AttachviewPlugin, AttachviewUiPlugin))
        .add_systems(Startup, open_initial_attachment)
        .run();
}

fn open_initial_attachment(
    mut initial: ResMut<InitialAttachment>,
    mut open: MessageWriter<OpenAttachment>,
) {
    if let Some(attachment) = initial.0.take() {
        open.write(OpenAttachment { attachment });
    }
}
