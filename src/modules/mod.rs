pub mod generation {
    pub mod model;
    pub mod client;
    pub mod client_replicate;
    pub mod upload;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod gallery {
    pub mod model;
    pub mod handle;
    pub mod service;
    pub mod route;
}
