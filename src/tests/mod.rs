mod common;

mod proxy_forwarding;
