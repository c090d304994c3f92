use structopt::StructOpt;

#[derive(Clone, Copy, StructOpt)]
pub enum Transport {
    #[structopt(name = "--udp")]
    Udp,
    #[structopt(name = "--tcp")]
    Tcp,
}

#[derive(Clone, StructOpt)]
pub struct Config {
    /// Port the echo server listens on.
    pub port: u16,
    /// Bytes handed to each send call.
    #[structopt(short = "l", default_value = "1024")]
    pub buffer_bytes: usize,
    /// Bytes to send in total.
    #[structopt(short = "n", default_value = "65536")]
    pub total_bytes: usize,
    /// Receive timeout of the client in milliseconds, zero waits forever.
    #[structopt(short = "t", default_value = "2000")]
    pub timeout: u64,

    #[structopt(subcommand)]
    pub transport: Transport,
}

impl Config {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }
}
