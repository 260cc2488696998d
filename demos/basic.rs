use std::time::Duration;

use resilient_http::{ClientOption, ClientOptions, HttpClient, PreparedRequest, RetryExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/200".to_owned());

    let settings = ClientOptions::from_env()?;
    let mut options = settings.to_client_options();
    options.push(ClientOption::DialerTimeout(Duration::from_secs(3)));

    let client = HttpClient::new(options)?;
    let executor = RetryExecutor::new(settings.retry_policy());

    let request =
        PreparedRequest::new(client.get(&url).build()?).with_timeout(Duration::from_secs(20));
    let response = executor.execute(&client, request).await?;

    println!("{} {}", response.status(), url);
    println!("{}", response.text().await?);

    Ok(())
}
