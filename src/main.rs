//! LearnHub Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    learnhub_backend::run().await;
}
