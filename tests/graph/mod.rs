mod conditional;
