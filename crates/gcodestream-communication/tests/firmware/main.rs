mod grbl;
