/// Split a command line into whitespace-delimited tokens.
///
/// No quoting or escaping is recognized (Non-goal) — a token is exactly a
/// maximal run of non-whitespace bytes. CR/LF trimming happens upstream in
/// the multiplexer before a line ever reaches the tokenizer.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
