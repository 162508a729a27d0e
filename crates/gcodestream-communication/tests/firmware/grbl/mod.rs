mod response_parser;
mod status_parser;
