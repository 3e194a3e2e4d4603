// Test-only fixture worker for exercising `GeneratorWorker`'s subprocess IPC
// against a real child process. Speaks the same READY handshake and
// length-prefixed framing as the real worker, but canned: it inspects the
// question text for marker substrings instead of doing any generation.
use std::io::{self, Read, Write};

fn read_frame(stdin: &mut io::Stdin) -> io::Result<String> {
    let mut len_bytes = [0u8; 4];
    stdin.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    stdin.read_exact(&mut payload)?;
    Ok(String::from_utf8_lossy(&payload).into_owned())
}

fn write_frame(stdout: &mut io::Stdout, payload: &str) -> io::Result<()> {
    let bytes = payload.as_bytes();
    stdout.write_all(&(bytes.len() as u32).to_le_bytes())?;
    stdout.write_all(bytes)?;
    stdout.flush()
}

fn question_of(prompt: &str) -> &str {
    prompt
        .rsplit_once("Question: ")
        .map(|(_, rest)| rest)
        .unwrap_or(prompt)
}

fn main() {
    println!("READY");
    io::stdout().flush().unwrap();

    let mut stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        let prompt = match read_frame(&mut stdin) {
            Ok(p) => p,
            Err(_) => return, // stdin closed, peer gave up on us
        };
        let question = question_of(&prompt);

        if question.contains("TRIGGER_CRASH") {
            std::process::exit(1);
        }

        if question.contains("TRIGGER_ERROR") {
            write_frame(&mut stdout, "ERROR:simulated failure").unwrap();
            continue;
        }

        if question.contains("EXIT_AFTER_REPLY") {
            write_frame(&mut stdout, "Answer: exiting after this one.").unwrap();
            std::process::exit(0);
        }

        let query_text = question.trim().trim_end_matches("Answer:").trim_end();
        let reply = format!("Answer: echoed back [{}]", query_text);
        write_frame(&mut stdout, &reply).unwrap();
    }
}
