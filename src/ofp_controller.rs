use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};

use crate::config::ControllerConfig;
use crate::ofp_switch::{Switch, Transport};

/// OpenFlow Controller
///
/// Accepts switch connections and runs one session thread per switch.
pub struct Controller {
    config: ControllerConfig,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Controller {
        Controller { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Bind the configured address and serve switches forever. `handler`
    /// registers callbacks on each new session before it starts.
    pub fn accept<F>(&self, handler: F) -> io::Result<()>
    where
        F: Fn(&mut Switch<TcpStream>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((self.config.listen_addr, self.config.port))?;
        info!("listening for switches on {}", listener.local_addr()?);
        self.accept_on(listener, handler)
    }

    /// Serve switches connecting to an already bound `listener`.
    pub fn accept_on<F>(&self, listener: TcpListener, handler: F) -> io::Result<()>
    where
        F: Fn(&mut Switch<TcpStream>) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_session(stream, Arc::clone(&handler)),
                Err(e) => warn!("accepting connection failed: {}", e),
            }
        }
        Ok(())
    }

    fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.config.tcp_nodelay)?;
        stream.set_read_timeout(self.config.read_timeout())?;
        stream.set_write_timeout(self.config.write_timeout())
    }

    fn spawn_session<F>(&self, stream: TcpStream, handler: Arc<F>)
    where
        F: Fn(&mut Switch<TcpStream>) + Send + Sync + 'static,
    {
        let peer = stream.peer();
        if let Err(e) = self.configure(&stream) {
            warn!("{}: could not configure socket: {}", peer, e);
        }
        info!("{}: switch connected", peer);
        let spawned = thread::Builder::new()
            .name(format!("ofp-session-{}", peer))
            .spawn(move || {
                let mut sw = Switch::new(stream);
                handler(&mut sw);
                match sw.serve() {
                    Ok(()) => info!("{}: session closed", peer),
                    Err(e) => error!("{}: session ended: {}", peer, e),
                }
            });
        if let Err(e) = spawned {
            error!("could not start session thread: {}", e);
        }
    }
}
