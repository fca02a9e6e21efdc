mod http_surface;
mod log_retention;
mod pipeline;
