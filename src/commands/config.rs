use crate::cli::ConfigAction;
use crate::error::Result;
use crate::settings::Settings;
use crate::store::Store;

pub async fn handle_config_command(settings: &Settings, action: ConfigAction) -> Result<()> {
    let store = Store::open(settings).await?;
    let config = store.config();

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value).await?;
            println!("{key} = {value}");
        }
        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key).await? {
                println!("{value}");
            }
        }
        ConfigAction::Show => {
            for (key, value) in config.all().await? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
