#[macro_use]
extern crate log;

use wamp_router::router::Router;

fn main() {
    env_logger::init();
    let mut router = Router::new();
    router.add_realm("turnpike.examples");
    info!("Router listening");
    let ws_child = router.listen("127.0.0.1:8090");
    let tcp_child = router
        .listen_tcp("127.0.0.1:8091")
        .expect("failed to bind raw-TCP listener");
    ws_child.join().unwrap();
    tcp_child.join().unwrap();
}
