use clap::Parser;
use clap::error::ErrorKind;
use registry_image_out::cli::{Args, Runner};
use registry_image_out::config::OutRequest;
use registry_image_out::error::OutError;
use registry_image_out::registry::{RegistryClient, RetryPolicy};
use registry_image_out::logging;
use registry_image_out::trust::NotarySigner;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    // Decode before logging is configured: the debug flag lives in the request
    let request = match OutRequest::from_reader(std::io::stdin().lock()) {
        Ok(request) => request,
        Err(err) => {
            logging::init(false);
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    logging::init(request.source.debug);

    let destination = match args.destination {
        Some(destination) => destination,
        None => {
            error!("{}", OutError::Argument);
            return ExitCode::FAILURE;
        }
    };

    let client = match RegistryClient::new(RetryPolicy::from_env()) {
        Ok(client) => client,
        Err(err) => {
            error!("failed to set up HTTP client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let runner = Runner::new(destination, Arc::new(client), Arc::new(NotarySigner::default()));
    match runner.run(&request).await {
        Ok(result) => match result.write_to(std::io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("failed to write response: {}", err);
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
