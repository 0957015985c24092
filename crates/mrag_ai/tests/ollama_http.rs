//! Ollama clients against a scripted loopback HTTP server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use mrag_ai::embeddings::ollama_embed::OllamaEmbedder;
use mrag_ai::embeddings::Embedder;
use mrag_ai::llm::ollama_llm::OllamaLlm;
use mrag_ai::llm::GenerationClient;
use mrag_ai::ollama::OllamaClient;
use mrag_core::error::codes;
use pretty_assertions::assert_eq;

struct Reply {
    status: &'static str,
    body: String,
}

fn reply(status: &'static str, body: impl Into<String>) -> Reply {
    Reply {
        status,
        body: body.into(),
    }
}

/// Serves one reply per connection, in order, and returns the raw requests it saw.
fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for r in replies {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().expect("length");
                }
                let end = line == "\r\n";
                head.push_str(&line);
                if end {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("read body");
            seen.push(format!("{head}{}", String::from_utf8_lossy(&body)));

            let resp = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                r.status,
                r.body.len(),
                r.body
            );
            stream.write_all(resp.as_bytes()).expect("write");
            stream.flush().expect("flush");
        }
        seen
    });
    (base_url, handle)
}

#[test]
fn embedder_posts_model_and_prompt() {
    let (base_url, server) = serve(vec![reply("200 OK", r#"{"embedding":[0.5,-0.25,1.0]}"#)]);
    let client = OllamaClient::new(&base_url).expect("client");
    let embedder = OllamaEmbedder::new(client, "paraphrase-multilingual");

    let v = embedder.embed("鏡像修改器").expect("embed");
    assert_eq!(v, vec![0.5, -0.25, 1.0]);
    assert_eq!(embedder.model_id(), "paraphrase-multilingual");

    let requests = server.join().expect("server");
    assert!(requests[0].starts_with("POST /api/embeddings "));
    assert!(requests[0].contains(r#""model":"paraphrase-multilingual""#));
    assert!(requests[0].contains(r#""prompt":"鏡像修改器""#));
}

#[test]
fn missing_embedding_model_is_embedding_unavailable() {
    let (base_url, server) = serve(vec![reply("404 Not Found", r#"{"error":"model not found"}"#)]);
    let embedder = OllamaEmbedder::new(OllamaClient::new(&base_url).expect("client"), "absent");

    let err = embedder.embed("text").expect_err("404");
    assert!(err.is(codes::EMBEDDING_UNAVAILABLE));
    assert!(err.retryable);
    server.join().expect("server");
}

#[test]
fn generation_streams_ndjson_fragments() {
    let body = concat!(
        "{\"response\":\"在物件模式\",\"done\":false}\n",
        "{\"response\":\"新增鏡像修改器\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true}\n",
    );
    let (base_url, server) = serve(vec![reply("200 OK", body)]);
    let llm = OllamaLlm::new(
        OllamaClient::new(&base_url).expect("client"),
        "gemma3:4b-it-q8_0",
        16_384,
    );

    let fragments: Vec<String> = llm
        .generate_stream("prompt text")
        .expect("stream")
        .map(|r| r.expect("fragment"))
        .collect();
    assert_eq!(fragments, vec!["在物件模式".to_string(), "新增鏡像修改器".to_string()]);

    let requests = server.join().expect("server");
    assert!(requests[0].starts_with("POST /api/generate "));
    assert!(requests[0].contains(r#""stream":true"#));
    assert!(requests[0].contains(r#""num_ctx":16384"#));
    assert!(requests[0].contains(r#""model":"gemma3:4b-it-q8_0""#));
}

#[test]
fn generation_error_status_is_upstream_unavailable() {
    let (base_url, server) = serve(vec![reply(
        "500 Internal Server Error",
        r#"{"error":"out of memory"}"#,
    )]);
    let llm = OllamaLlm::new(OllamaClient::new(&base_url).expect("client"), "m", 2048);

    let err = match llm.generate_stream("p") {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(err.is(codes::UPSTREAM_UNAVAILABLE));
    assert!(err.details.as_deref().is_some_and(|d| d.contains("out of memory")));
    server.join().expect("server");
}

#[test]
fn health_check_hits_tags_endpoint() {
    let (base_url, server) = serve(vec![reply("200 OK", r#"{"models":[]}"#)]);
    let llm = OllamaLlm::new(OllamaClient::new(&base_url).expect("client"), "m", 2048);

    llm.health_check().expect("healthy");
    let requests = server.join().expect("server");
    assert!(requests[0].starts_with("GET /api/tags "));
}
