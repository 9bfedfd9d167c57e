use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};

use iothub_data_formats::{constants::LONG_LIVED_TOKEN_VALIDITY_SECS, TokenSigner};
use iothub_http_wrapper::{HubResponse, ServiceClient};

const COMPONENT: &str = "iothub-tool";
const DEFAULT_DEMO_DEVICE_ID: &str = "testDevice1";

#[derive(Parser)]
#[clap(version)]
struct Cli {
    /// Connection string; defaults to the configured one, then $CONNECTION_STRING
    #[clap(long, global = true, action = ArgAction::Set)]
    connection_string: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists device records
    List(ListArguments),
    /// Creates (or overwrites) a device record
    Create(DeviceArguments),
    /// Retrieves a device record
    Get(DeviceArguments),
    /// Deletes a device record
    Delete(DeviceArguments),
    /// Removes pending cloud-to-device commands of a device
    Purge(DeviceArguments),
    /// Sends a message as the device from the connection string
    Send(SendArguments),
    /// Receives a message for the device from the connection string
    Receive,
    /// Prints a shared access signature for a resource
    Sign(SignArguments),
    /// Runs the provisioning or messaging sequence, depending on the credentials
    Demo(DemoArguments),
}

#[derive(Args)]
struct ListArguments {
    /// Maximum number of records to return
    #[clap(long, default_value_t = 10, action = ArgAction::Set)]
    top: usize,
}

#[derive(Args)]
struct DeviceArguments {
    /// Identifier of the device
    device_id: String,
}

#[derive(Args)]
struct SendArguments {
    /// Message payload, sent verbatim
    payload: String,
}

#[derive(Args)]
struct SignArguments {
    /// Resource to sign; defaults to the hub host name
    resource: Option<String>,
    /// Token lifetime in seconds; defaults to the configured validity
    #[clap(long, action = ArgAction::Set)]
    validity: Option<u64>,
    /// Use the long-lived (one year) token lifetime
    #[clap(long, conflicts_with = "validity")]
    long_lived: bool,
}

#[derive(Args)]
struct DemoArguments {
    /// Device record to provision when running with service credentials
    #[clap(long, default_value = DEFAULT_DEMO_DEVICE_ID, action = ArgAction::Set)]
    device_id: String,
    /// Number of messages to send when running with device credentials
    #[clap(long, default_value_t = 10, action = ArgAction::Set)]
    count: usize,
}

fn print_response(resp: &HubResponse) {
    println!("{}", resp.status_line());
    if !resp.body().is_empty() {
        println!("{}", resp.body());
    }
}

fn sign(client: &ServiceClient, args: &SignArguments) -> Result<()> {
    let resource = args
        .resource
        .as_deref()
        .unwrap_or_else(|| client.credentials().host_name());

    let validity = if args.long_lived {
        Some(LONG_LIVED_TOKEN_VALIDITY_SECS)
    } else {
        args.validity
    };
    let token = match validity {
        Some(secs) => TokenSigner::new(client.credentials(), Duration::from_secs(secs))?
            .sign_now(resource)?,
        None => client.signer().sign_now(resource)?,
    };

    println!("{}", token);
    Ok(())
}

fn demo(client: &ServiceClient, args: &DemoArguments) -> Result<()> {
    if !client.is_device() {
        log::info!("No DeviceId in connection string, running provisioning sequence");
        let registry = client.registry()?;
        print_response(&registry.list_devices(10)?);
        print_response(&registry.create_device(&args.device_id)?);
        print_response(&registry.get_device(&args.device_id)?);
        print_response(&registry.purge_commands(&args.device_id)?);
    } else {
        log::info!("DeviceId in connection string, running messaging sequence");
        let device = client.device()?;
        print_response(&device.receive_message()?);
        for i in 0..args.count {
            print_response(&device.send_message(&format!(r#"{{"count":{}}}"#, i))?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let client = iothub_util::client_for(COMPONENT, cli.connection_string.as_deref())
        .context("Error setting up hub client")?;

    match &cli.command {
        Commands::List(args) => print_response(&client.registry()?.list_devices(args.top)?),
        Commands::Create(args) => {
            print_response(&client.registry()?.create_device(&args.device_id)?)
        }
        Commands::Get(args) => print_response(&client.registry()?.get_device(&args.device_id)?),
        Commands::Delete(args) => {
            print_response(&client.registry()?.delete_device(&args.device_id)?)
        }
        Commands::Purge(args) => {
            print_response(&client.registry()?.purge_commands(&args.device_id)?)
        }
        Commands::Send(args) => print_response(&client.device()?.send_message(&args.payload)?),
        Commands::Receive => print_response(&client.device()?.receive_message()?),
        Commands::Sign(args) => sign(&client, args)?,
        Commands::Demo(args) => demo(&client, args)?,
    }

    Ok(())
}
