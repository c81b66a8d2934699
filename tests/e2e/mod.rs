// End-to-end tests for the Narration Backend HTTP API
//
// Each test starts the full axum application on an ephemeral port, backed by
// its own in-memory SQLite database and a scripted TTS provider. The provider
// decides its answer from the credential secret and the chunk text, so tests
// can stage rate limits, rejected keys and slow or failing chunks.

mod helpers;
mod test_credentials;
mod test_health;
mod test_jobs;
