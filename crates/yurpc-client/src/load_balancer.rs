use rand::Rng;
use yurpc_common::Endpoint;

/// Picks one endpoint uniformly at random.
///
/// Returns `None` for an empty candidate list.
pub fn select_endpoint(endpoints: &[Endpoint]) -> Option<&Endpoint> {
    match endpoints.len() {
        0 => None,
        1 => endpoints.first(),
        n => endpoints.get(rand::rng().random_range(0..n)),
    }
}
