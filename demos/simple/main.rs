use featureflow::{ClientConfig, Context, Feature};

pub fn main() {
    env_logger::init();

    // Without FEATUREFLOW_API_KEY the client runs offline on the features declared below.
    let mut config = match std::env::var("FEATUREFLOW_API_KEY") {
        Ok(api_key) => ClientConfig::from_api_key(api_key),
        Err(_) => ClientConfig::offline(),
    };
    config
        .with_features([
            Feature::new("example-feature").build(),
            Feature::new("dark-mode").variant("dark").build(),
        ])
        .evaluation_logger(|event: featureflow::EvaluationEvent| {
            println!("Evaluated: {:?}", event);
        });
    let client = config.to_client().unwrap();

    // Start fetching feature definitions in the background.
    client.start().unwrap();

    // Block waiting for definitions. Until this call returns, the client serves the local
    // features above.
    if let Err(err) = client.wait_for_ready() {
        eprintln!("Failed to fetch feature definitions: {}", err);
    }

    let context = Context::builder("user@example.com")
        .with_attribute("subscription", "premium")
        .build()
        .unwrap();

    let example = client.evaluate("example-feature", Some(&context));
    println!("example-feature is on: {}", example.is_on());

    let theme = client.evaluate_with_fallback("dark-mode", Some(&context), "light");
    println!("Theme: {}", theme.variant());

    client.shutdown().unwrap();
}
