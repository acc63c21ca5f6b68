//! Protocols for decoding the output of a thunk into a stream of values.

use std::{
   collections::BTreeMap,
   io::Cursor,
   sync::Arc,
};

use bytes::Bytes;

use super::{
   JsonSource,
   Source,
   StaticSource,
};
use crate::{
   Annotated,
   Error,
   FileOrDir,
   FsPath,
   Result,
   Scope,
   Value,
};

/// Every protocol name [`decode`] understands.
pub const PROTOCOLS: &[&str] = &["raw", "lines", "unix-table", "json", "tar"];

/// Decodes buffered output with the named protocol.
pub fn decode(protocol: &str, data: Bytes) -> Result<Source> {
   Ok(match protocol {
      "raw" => {
         let content = String::from_utf8_lossy(&data).into_owned();
         Source::new(StaticSource::new("raw", [Value::from(content)]))
      },

      "lines" => Source::new(StaticSource::new("lines", lines(&data).map(Value::from))),

      "unix-table" => {
         let rows = lines(&data).map(|line| Value::list(line.split_whitespace().map(Value::from)));
         Source::new(StaticSource::new("unix-table", rows))
      },

      "json" => Source::new(JsonSource::new("json", Cursor::new(data))),

      "tar" => {
         let entries = entries(&data)?;
         Source::new(StaticSource::new("tar", entries.iter().map(TarEntry::to_value)))
      },

      _ => {
         return Err(Error::UnknownProtocol {
            name: protocol.to_owned(),
         });
      },
   })
}

/// Lines without their terminators. A final newline does not start another
/// line.
fn lines(data: &[u8]) -> impl Iterator<Item = String> + '_ {
   let empty = data.is_empty();
   let data = data.strip_suffix(b"\n").unwrap_or(data);

   data
      .split(|&byte| byte == b'\n')
      .filter(move |_| !empty)
      .map(|line| {
         let line = line.strip_suffix(b"\r").unwrap_or(line);
         String::from_utf8_lossy(line).into_owned()
      })
}

const BLOCK: usize = 512;

/// One entry of a tar archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
   pub name: String,
   /// The header typeflag, with the legacy `\0` normalized to `0`.
   pub kind: char,
   pub mode: i64,
   pub size: u64,
   pub link: Option<String>,
   pub data: Bytes,
}

impl TarEntry {
   #[must_use]
   pub fn is_file(&self) -> bool {
      matches!(self.kind, '0' | '7')
   }

   #[must_use]
   pub fn is_dir(&self) -> bool {
      self.kind == '5'
   }

   /// The entry as a single-file in-memory filesystem, annotated with its
   /// header fields.
   #[must_use]
   pub fn to_value(&self) -> Value {
      let (files, path) = if self.is_dir() {
         (BTreeMap::new(), FileOrDir::Dir(crate::DirPath::new(&self.name)))
      } else {
         let path = FileOrDir::File(crate::FilePath::new(&self.name));
         (
            BTreeMap::from([(path.path().to_owned(), self.data.clone())]),
            path,
         )
      };

      let meta = Scope::new();
      meta.set("type", Value::from(self.kind.to_string()));
      meta.set("name", Value::string(&*self.name));
      if let Some(ref link) = self.link {
         meta.set("link", Value::string(&**link));
      }
      meta.set("size", Value::Int(i64::try_from(self.size).unwrap_or(i64::MAX)));
      meta.set("mode", Value::Int(self.mode));

      Value::Annotated(Arc::new(Annotated {
         value: Value::FsPath(Arc::new(FsPath::new(files).with_path(path))),
         meta,
      }))
   }
}

fn field(header: &[u8], start: usize, len: usize) -> String {
   let raw = &header[start..start + len];
   let end = raw.iter().position(|&byte| byte == 0).unwrap_or(raw.len());

   String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn octal(header: &[u8], start: usize, len: usize) -> Result<u64> {
   let text = field(header, start, len);
   let text = text.trim_matches(|char: char| char == ' ' || char == '\0');

   if text.is_empty() {
      return Ok(0);
   }

   u64::from_str_radix(text, 8)
      .map_err(|_| Error::Host(bass_error::error!("malformed tar header number: {text:?}")))
}

/// The `path` record of a PAX extended header.
fn pax_path(data: &[u8]) -> Option<String> {
   let mut rest = data;

   while !rest.is_empty() {
      let space = rest.iter().position(|&byte| byte == b' ')?;
      let len = std::str::from_utf8(&rest[..space]).ok()?.parse::<usize>().ok()?;
      let record = rest.get(space + 1..len)?;

      if let Some(path) = record.strip_prefix(b"path=") {
         let path = path.strip_suffix(b"\n").unwrap_or(path);
         return Some(String::from_utf8_lossy(path).into_owned());
      }

      rest = rest.get(len..)?;
   }

   None
}

/// Parses a ustar archive, including GNU long names and PAX path records.
pub fn entries(archive: &[u8]) -> Result<Vec<TarEntry>> {
   let mut entries = Vec::new();
   let mut long_name = None;
   let mut offset = 0;

   while offset + BLOCK <= archive.len() {
      let header = &archive[offset..offset + BLOCK];
      offset += BLOCK;

      if header.iter().all(|&byte| byte == 0) {
         break;
      }

      let size = octal(header, 124, 12)?;
      let len = usize::try_from(size)
         .map_err(|_| Error::Host(bass_error::error!("tar entry too large: {size} bytes")))?;

      let Some(data) = archive.get(offset..offset + len) else {
         return Err(Error::Host(bass_error::error!("truncated tar archive")));
      };
      offset += len.div_ceil(BLOCK) * BLOCK;

      let kind = match header[156] {
         0 => '0',
         flag => char::from(flag),
      };

      match kind {
         'L' => {
            let end = data.iter().position(|&byte| byte == 0).unwrap_or(data.len());
            long_name = Some(String::from_utf8_lossy(&data[..end]).into_owned());
            continue;
         },

         'x' => {
            long_name = pax_path(data);
            continue;
         },

         'g' => continue,

         _ => {},
      }

      let name = long_name.take().unwrap_or_else(|| {
         let name = field(header, 0, 100);
         let prefix = field(header, 345, 155);

         if &header[257..262] == b"ustar" && !prefix.is_empty() {
            format!("{prefix}/{name}")
         } else {
            name
         }
      });

      let link = field(header, 157, 100);

      entries.push(TarEntry {
         name,
         kind,
         mode: i64::try_from(octal(header, 100, 8)?).unwrap_or_default(),
         size,
         link: (!link.is_empty()).then_some(link),
         data: Bytes::copy_from_slice(data),
      });
   }

   Ok(entries)
}

#[cfg(test)]
pub(crate) mod tests {
   use super::*;
   use crate::EvalCtx;

   fn header(name: &str, kind: u8, size: usize) -> Vec<u8> {
      let mut header = vec![0; BLOCK];
      header[..name.len()].copy_from_slice(name.as_bytes());
      header[100..107].copy_from_slice(b"0000644");
      header[124..135].copy_from_slice(format!("{size:011o}").as_bytes());
      header[156] = kind;
      header[257..263].copy_from_slice(b"ustar\0");
      header
   }

   /// Builds an archive from `(name, typeflag, content)` triples.
   pub(crate) fn archive(files: &[(&str, u8, &str)]) -> Vec<u8> {
      let mut archive = Vec::new();

      for &(name, kind, content) in files {
         archive.extend(header(name, kind, content.len()));
         archive.extend(content.as_bytes());
         archive.resize(archive.len().div_ceil(BLOCK) * BLOCK, 0);
      }

      archive.resize(archive.len() + 2 * BLOCK, 0);
      archive
   }

   async fn drain(source: &Source) -> Vec<Value> {
      let ctx = EvalCtx::new();
      let mut values = Vec::new();

      loop {
         match source.next(&ctx).await {
            Ok(value) => values.push(value),
            Err(Error::EndOfSource) => return values,
            Err(error) => panic!("unexpected error: {error}"),
         }
      }
   }

   #[tokio::test]
   async fn raw_and_lines() {
      let data = Bytes::from_static(b"one\r\n\nthree\n");

      let raw = drain(&decode("raw", data.clone()).unwrap()).await;
      assert_eq!(raw, [Value::string("one\r\n\nthree\n")]);

      let lines = drain(&decode("lines", data).unwrap()).await;
      assert_eq!(lines, [
         Value::string("one"),
         Value::string(""),
         Value::string("three"),
      ]);

      assert!(drain(&decode("lines", Bytes::new()).unwrap()).await.is_empty());
   }

   #[tokio::test]
   async fn unix_tables() {
      let data = Bytes::from_static(b"a  b\tc\n\nd\n");
      let rows = drain(&decode("unix-table", data).unwrap()).await;

      assert_eq!(rows, [
         Value::list([Value::string("a"), Value::string("b"), Value::string("c")]),
         Value::Empty,
         Value::list([Value::string("d")]),
      ]);
   }

   #[tokio::test]
   async fn json_values() {
      let data = Bytes::from_static(b"{\"a\": 1}\n[2]\n");
      let values = drain(&decode("json", data).unwrap()).await;

      assert_eq!(values.len(), 2);
      assert_eq!(values[1], Value::list([Value::Int(2)]));
   }

   #[test]
   fn unknown_protocols() {
      assert!(matches!(
         decode("xml", Bytes::new()),
         Err(Error::UnknownProtocol { ref name }) if name == "xml"
      ));
   }

   #[test]
   fn tar_entries() {
      let long = "deep/".repeat(30) + "file";

      let mut archive = Vec::new();
      archive.extend(header("././@LongLink", b'L', long.len() + 1));
      archive.extend(long.as_bytes());
      archive.push(0);
      archive.resize(archive.len().div_ceil(BLOCK) * BLOCK, 0);
      archive.extend(self::archive(&[("dir/", b'5', ""), ("dir/hello", b'0', "hi\n")]));

      let entries = entries(&archive).unwrap();
      let summary = entries
         .iter()
         .map(|entry| (entry.name.as_str(), entry.kind, entry.size))
         .collect::<Vec<_>>();

      assert_eq!(summary, [
         (long.as_str(), '5', 0),
         ("dir/hello", '0', 3),
      ]);
      assert_eq!(entries[1].data, Bytes::from_static(b"hi\n"));
      assert_eq!(entries[1].mode, 0o644);
   }

   #[tokio::test]
   async fn tar_values_are_annotated_filesystems() {
      let data = Bytes::from(archive(&[("out/", b'5', ""), ("out/report.txt", b'0', "ok")]));
      let values = drain(&decode("tar", data).unwrap()).await;

      assert_eq!(values.len(), 2);

      let meta = values[1].meta().unwrap();
      assert_eq!(meta.get(&"name".into()), Some(Value::string("out/report.txt")));
      assert_eq!(meta.get(&"type".into()), Some(Value::string("0")));
      assert_eq!(meta.get(&"size".into()), Some(Value::Int(2)));

      let Value::FsPath(ref file) = *values[1].unannotated() else {
         panic!("expected an fs path");
      };
      assert_eq!(file.read().unwrap(), Bytes::from_static(b"ok"));

      let Value::FsPath(ref dir) = *values[0].unannotated() else {
         panic!("expected an fs path");
      };
      assert!(dir.path.is_dir());
   }
}
