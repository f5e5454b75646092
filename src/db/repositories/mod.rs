mod rounds;
mod sessions;
