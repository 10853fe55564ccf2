/// A benchmark input fed to the request either whole or in fixed size chunks.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
    chunk_size: Option<usize>,
}

impl TestCase {
    pub fn whole(name: &'static str, file: TestFile) -> Self {
        Self { name, file, chunk_size: None }
    }

    /// Splits the input so tokens cross chunk boundaries.
    pub fn chunked(name: &'static str, file: TestFile, chunk_size: usize) -> Self {
        Self { name, file, chunk_size: Some(chunk_size) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn file_name(&self) -> &'static str {
        self.file().file_name
    }

    pub fn chunks(&self) -> std::slice::Chunks<'static, u8> {
        let content = self.file.content.as_bytes();
        content.chunks(self.chunk_size.unwrap_or(content.len()).max(1))
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}
