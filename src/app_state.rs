#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
}
